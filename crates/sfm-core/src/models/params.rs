use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::CameraModel;
use crate::{with_camera_model, Real, Vec2};

/// Errors raised when building camera parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("unknown camera model `{0}`")]
    UnknownModel(String),
    #[error("camera model {model} expects {expected} params, got {got}")]
    ParamCount {
        model: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("focal length param {idx} must be positive and finite, got {value}")]
    InvalidFocalLength { idx: usize, value: Real },
}

/// Runtime tag of a [`CameraModel`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraModelKind {
    SimplePinhole,
    Pinhole,
    SimpleRadial,
    Radial,
    #[serde(rename = "opencv")]
    OpenCv,
}

impl CameraModelKind {
    /// All supported models.
    pub const ALL: [CameraModelKind; 5] = [
        CameraModelKind::SimplePinhole,
        CameraModelKind::Pinhole,
        CameraModelKind::SimpleRadial,
        CameraModelKind::Radial,
        CameraModelKind::OpenCv,
    ];

    /// Number of intrinsic parameters of the model.
    pub fn num_params(self) -> usize {
        with_camera_model!(self, M => M::NUM_PARAMS)
    }

    /// Canonical model name.
    pub fn name(self) -> &'static str {
        match self {
            CameraModelKind::SimplePinhole => "simple_pinhole",
            CameraModelKind::Pinhole => "pinhole",
            CameraModelKind::SimpleRadial => "simple_radial",
            CameraModelKind::Radial => "radial",
            CameraModelKind::OpenCv => "opencv",
        }
    }

    /// Look a model up by its canonical name (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self, ModelError> {
        let lower = name.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == lower)
            .ok_or_else(|| ModelError::UnknownModel(name.to_string()))
    }

    pub fn focal_length_idxs(self) -> &'static [usize] {
        with_camera_model!(self, M => M::FOCAL_LENGTH_IDXS)
    }

    pub fn principal_point_idxs(self) -> &'static [usize] {
        with_camera_model!(self, M => M::PRINCIPAL_POINT_IDXS)
    }

    pub fn extra_params_idxs(self) -> &'static [usize] {
        with_camera_model!(self, M => M::EXTRA_PARAMS_IDXS)
    }

    /// Project normalized coordinates to pixels with this model.
    pub fn world_to_image(self, params: &[Real], x: Real, y: Real) -> Vec2 {
        with_camera_model!(self, M => M::world_to_image(params, x, y))
    }

    /// Back-project pixels to normalized coordinates with this model.
    pub fn image_to_world(self, params: &[Real], u: Real, v: Real) -> Vec2 {
        with_camera_model!(self, M => M::image_to_world(params, u, v))
    }
}

impl std::fmt::Display for CameraModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Serializable camera: a model tag plus its intrinsic parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraParams {
    pub model: CameraModelKind,
    pub params: Vec<Real>,
}

impl CameraParams {
    /// Build validated camera parameters.
    pub fn new(model: CameraModelKind, params: Vec<Real>) -> Result<Self, ModelError> {
        let cam = Self { model, params };
        cam.validate()?;
        Ok(cam)
    }

    /// Check the parameter count and focal lengths.
    ///
    /// Deserialized values are not validated automatically.
    pub fn validate(&self) -> Result<(), ModelError> {
        let expected = self.model.num_params();
        if self.params.len() != expected {
            return Err(ModelError::ParamCount {
                model: self.model.name(),
                expected,
                got: self.params.len(),
            });
        }
        for &idx in self.model.focal_length_idxs() {
            let value = self.params[idx];
            if !(value.is_finite() && value > 0.0) {
                return Err(ModelError::InvalidFocalLength { idx, value });
            }
        }
        Ok(())
    }

    /// Mean focal length in pixels.
    pub fn mean_focal_length(&self) -> Real {
        let idxs = self.model.focal_length_idxs();
        idxs.iter().map(|&i| self.params[i]).sum::<Real>() / idxs.len() as Real
    }

    pub fn world_to_image(&self, normalized: &Vec2) -> Vec2 {
        self.model
            .world_to_image(&self.params, normalized.x, normalized.y)
    }

    pub fn image_to_world(&self, pixel: &Vec2) -> Vec2 {
        self.model.image_to_world(&self.params, pixel.x, pixel.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_roundtrip() {
        for kind in CameraModelKind::ALL {
            assert_eq!(CameraModelKind::from_name(kind.name()).unwrap(), kind);
        }
        assert_eq!(
            CameraModelKind::from_name("OPENCV").unwrap(),
            CameraModelKind::OpenCv
        );
        assert!(matches!(
            CameraModelKind::from_name("fisheye"),
            Err(ModelError::UnknownModel(_))
        ));
    }

    #[test]
    fn validation_rejects_bad_params() {
        let err = CameraParams::new(CameraModelKind::Pinhole, vec![1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(
            err,
            ModelError::ParamCount {
                model: "pinhole",
                expected: 4,
                got: 3
            }
        );

        let err =
            CameraParams::new(CameraModelKind::SimpleRadial, vec![0.0, 1.0, 1.0, 0.0]).unwrap_err();
        assert!(matches!(err, ModelError::InvalidFocalLength { idx: 0, .. }));
    }

    #[test]
    fn camera_params_json_roundtrip() {
        let cam = CameraParams::new(CameraModelKind::Radial, vec![700.0, 320.0, 240.0, -0.1, 0.01])
            .unwrap();
        let json = serde_json::to_string_pretty(&cam).unwrap();
        assert!(json.contains("\"radial\""));
        let restored: CameraParams = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, cam);
        assert!((restored.mean_focal_length() - 700.0).abs() < 1e-12);
    }
}
