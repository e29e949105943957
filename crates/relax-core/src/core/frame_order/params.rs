use super::FrameOrderError;
use super::model::FrameOrderModel;
use crate::core::integration::{Domain, TiltLimit};
use crate::core::utils::geometry::{
    GeometryError, euler_to_r_zyz, spherical_to_cartesian, two_vect_to_r,
};
use nalgebra::{Matrix3, Vector3};
use std::f64::consts::PI;

/// An average-position or eigenframe orientation in the z-y-z convention.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EulerAngles {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl EulerAngles {
    pub fn new(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self { alpha, beta, gamma }
    }

    pub fn to_matrix(&self) -> Matrix3<f64> {
        euler_to_r_zyz(self.alpha, self.beta, self.gamma)
    }
}

/// The motional part of a frame-order parameter set, one variant per model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Motion {
    Rigid,
    Rotor {
        axis_alpha: f64,
        sigma_max: f64,
    },
    FreeRotor {
        axis_alpha: f64,
    },
    IsoCone {
        axis_theta: f64,
        axis_phi: f64,
        cone_theta: f64,
        sigma_max: f64,
    },
    IsoConeTorsionless {
        axis_theta: f64,
        axis_phi: f64,
        cone_theta: f64,
    },
    IsoConeFreeRotor {
        axis_theta: f64,
        axis_phi: f64,
        cone_theta: f64,
    },
    PseudoEllipse {
        eigen: EulerAngles,
        theta_x: f64,
        theta_y: f64,
        sigma_max: f64,
    },
    PseudoEllipseTorsionless {
        eigen: EulerAngles,
        theta_x: f64,
        theta_y: f64,
    },
    PseudoEllipseFreeRotor {
        eigen: EulerAngles,
        theta_x: f64,
        theta_y: f64,
    },
    DoubleRotor {
        pivot_disp: f64,
        eigen: EulerAngles,
        sigma_max: f64,
        sigma_max_2: f64,
    },
}

/// A decoded frame-order parameter vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameOrderParams {
    /// The optimised pivot (the second pivot for the double rotor), present only with `pivot_opt`.
    pub pivot: Option<Vector3<f64>>,
    pub translation: Vector3<f64>,
    pub ave: EulerAngles,
    pub motion: Motion,
}

struct Cursor<'a> {
    values: &'a [f64],
    pos: usize,
}

impl Cursor<'_> {
    fn next(&mut self) -> f64 {
        let value = self.values[self.pos];
        self.pos += 1;
        value
    }

    fn next_vector(&mut self) -> Vector3<f64> {
        Vector3::new(self.next(), self.next(), self.next())
    }

    fn next_euler(&mut self) -> EulerAngles {
        EulerAngles::new(self.next(), self.next(), self.next())
    }
}

impl FrameOrderParams {
    /// Unpacks a flat parameter vector according to the model's layout.
    ///
    /// Amplitude angles (cone half-angles and torsion limits) must lie in `[0, pi]`.
    pub fn decode(
        model: FrameOrderModel,
        pivot_opt: bool,
        values: &[f64],
    ) -> Result<Self, FrameOrderError> {
        let expected = model.param_num(pivot_opt);
        if values.len() != expected {
            return Err(FrameOrderError::ParameterCount {
                model: model.name(),
                expected,
                found: values.len(),
            });
        }

        let mut cursor = Cursor { values, pos: 0 };
        let pivot = (pivot_opt && !model.is_rigid()).then(|| cursor.next_vector());
        let pivot_disp = matches!(model, FrameOrderModel::DoubleRotor).then(|| cursor.next());
        let translation = cursor.next_vector();
        let ave = if model.is_free_rotor() {
            EulerAngles::new(0.0, cursor.next(), cursor.next())
        } else {
            cursor.next_euler()
        };

        let motion = match model {
            FrameOrderModel::Rigid => Motion::Rigid,
            FrameOrderModel::Rotor => Motion::Rotor {
                axis_alpha: cursor.next(),
                sigma_max: cursor.next(),
            },
            FrameOrderModel::FreeRotor => Motion::FreeRotor {
                axis_alpha: cursor.next(),
            },
            FrameOrderModel::IsoCone => Motion::IsoCone {
                axis_theta: cursor.next(),
                axis_phi: cursor.next(),
                cone_theta: cursor.next(),
                sigma_max: cursor.next(),
            },
            FrameOrderModel::IsoConeTorsionless => Motion::IsoConeTorsionless {
                axis_theta: cursor.next(),
                axis_phi: cursor.next(),
                cone_theta: cursor.next(),
            },
            FrameOrderModel::IsoConeFreeRotor => Motion::IsoConeFreeRotor {
                axis_theta: cursor.next(),
                axis_phi: cursor.next(),
                cone_theta: cursor.next(),
            },
            FrameOrderModel::PseudoEllipse => Motion::PseudoEllipse {
                eigen: cursor.next_euler(),
                theta_x: cursor.next(),
                theta_y: cursor.next(),
                sigma_max: cursor.next(),
            },
            FrameOrderModel::PseudoEllipseTorsionless => Motion::PseudoEllipseTorsionless {
                eigen: cursor.next_euler(),
                theta_x: cursor.next(),
                theta_y: cursor.next(),
            },
            FrameOrderModel::PseudoEllipseFreeRotor => Motion::PseudoEllipseFreeRotor {
                eigen: cursor.next_euler(),
                theta_x: cursor.next(),
                theta_y: cursor.next(),
            },
            FrameOrderModel::DoubleRotor => Motion::DoubleRotor {
                pivot_disp: pivot_disp.unwrap_or_default(),
                eigen: cursor.next_euler(),
                sigma_max: cursor.next(),
                sigma_max_2: cursor.next(),
            },
        };

        let params = Self {
            pivot,
            translation,
            ave,
            motion,
        };
        params.validate(model, values)?;
        Ok(params)
    }

    fn validate(&self, model: FrameOrderModel, values: &[f64]) -> Result<(), FrameOrderError> {
        for (name, value) in model.param_names(self.pivot.is_some()).iter().zip(values) {
            let out_of_domain = !value.is_finite()
                || (FrameOrderModel::is_amplitude_param(name) && !(0.0..=PI).contains(value));
            if out_of_domain {
                return Err(FrameOrderError::AngleOutOfDomain {
                    model: model.name(),
                    parameter: *name,
                    value: *value,
                });
            }
        }
        Ok(())
    }

    /// Flattens the parameters back into the model's vector layout.
    pub fn encode(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(16);
        if let Some(pivot) = self.pivot {
            out.extend(pivot.iter());
        }
        if let Motion::DoubleRotor { pivot_disp, .. } = self.motion {
            out.push(pivot_disp);
        }
        out.extend(self.translation.iter());
        if !self.motion.model().is_free_rotor() {
            out.push(self.ave.alpha);
        }
        out.extend([self.ave.beta, self.ave.gamma]);

        match self.motion {
            Motion::Rigid => {}
            Motion::Rotor {
                axis_alpha,
                sigma_max,
            } => out.extend([axis_alpha, sigma_max]),
            Motion::FreeRotor { axis_alpha } => out.push(axis_alpha),
            Motion::IsoCone {
                axis_theta,
                axis_phi,
                cone_theta,
                sigma_max,
            } => out.extend([axis_theta, axis_phi, cone_theta, sigma_max]),
            Motion::IsoConeTorsionless {
                axis_theta,
                axis_phi,
                cone_theta,
            }
            | Motion::IsoConeFreeRotor {
                axis_theta,
                axis_phi,
                cone_theta,
            } => out.extend([axis_theta, axis_phi, cone_theta]),
            Motion::PseudoEllipse {
                eigen,
                theta_x,
                theta_y,
                sigma_max,
            } => out.extend([
                eigen.alpha,
                eigen.beta,
                eigen.gamma,
                theta_x,
                theta_y,
                sigma_max,
            ]),
            Motion::PseudoEllipseTorsionless {
                eigen,
                theta_x,
                theta_y,
            }
            | Motion::PseudoEllipseFreeRotor {
                eigen,
                theta_x,
                theta_y,
            } => out.extend([eigen.alpha, eigen.beta, eigen.gamma, theta_x, theta_y]),
            Motion::DoubleRotor {
                eigen,
                sigma_max,
                sigma_max_2,
                ..
            } => out.extend([eigen.alpha, eigen.beta, eigen.gamma, sigma_max, sigma_max_2]),
        }
        out
    }
}

impl Motion {
    pub fn model(&self) -> FrameOrderModel {
        match self {
            Self::Rigid => FrameOrderModel::Rigid,
            Self::Rotor { .. } => FrameOrderModel::Rotor,
            Self::FreeRotor { .. } => FrameOrderModel::FreeRotor,
            Self::IsoCone { .. } => FrameOrderModel::IsoCone,
            Self::IsoConeTorsionless { .. } => FrameOrderModel::IsoConeTorsionless,
            Self::IsoConeFreeRotor { .. } => FrameOrderModel::IsoConeFreeRotor,
            Self::PseudoEllipse { .. } => FrameOrderModel::PseudoEllipse,
            Self::PseudoEllipseTorsionless { .. } => FrameOrderModel::PseudoEllipseTorsionless,
            Self::PseudoEllipseFreeRotor { .. } => FrameOrderModel::PseudoEllipseFreeRotor,
            Self::DoubleRotor { .. } => FrameOrderModel::DoubleRotor,
        }
    }

    /// The rotation taking the model's own frame (motion axis along z) into the reference frame.
    ///
    /// Rotor models need the centre of mass to define their axis.
    pub fn eigenframe(
        &self,
        pivot: &Vector3<f64>,
        com: Option<&Vector3<f64>>,
    ) -> Result<Matrix3<f64>, FrameOrderError> {
        let model = self.model().name();
        let geometry = |source| FrameOrderError::Geometry { model, source };
        match *self {
            Self::Rigid => Ok(Matrix3::identity()),
            Self::Rotor { axis_alpha, .. } | Self::FreeRotor { axis_alpha } => {
                let com = com.ok_or(FrameOrderError::MissingGeometry {
                    model,
                    what: "a centre of mass",
                })?;
                let axis = create_rotor_axis(axis_alpha, pivot, com).map_err(geometry)?;
                two_vect_to_r(&Vector3::z(), &axis).map_err(geometry)
            }
            Self::IsoCone {
                axis_theta,
                axis_phi,
                ..
            }
            | Self::IsoConeTorsionless {
                axis_theta,
                axis_phi,
                ..
            }
            | Self::IsoConeFreeRotor {
                axis_theta,
                axis_phi,
                ..
            } => {
                let axis = spherical_to_cartesian(1.0, axis_theta, axis_phi);
                two_vect_to_r(&Vector3::z(), &axis).map_err(geometry)
            }
            Self::PseudoEllipse { eigen, .. }
            | Self::PseudoEllipseTorsionless { eigen, .. }
            | Self::PseudoEllipseFreeRotor { eigen, .. }
            | Self::DoubleRotor { eigen, .. } => Ok(eigen.to_matrix()),
        }
    }

    /// The angular domain of the motion, `None` for the rigid model.
    pub fn domain(&self) -> Option<Domain> {
        match *self {
            Self::Rigid => None,
            Self::Rotor { sigma_max, .. } => Some(Domain::Torsion { sigma_max }),
            Self::FreeRotor { .. } => Some(Domain::Torsion { sigma_max: PI }),
            Self::IsoCone {
                cone_theta,
                sigma_max,
                ..
            } => Some(Domain::Cone {
                tilt: TiltLimit::Iso(cone_theta),
                sigma_max: Some(sigma_max),
            }),
            Self::IsoConeTorsionless { cone_theta, .. } => Some(Domain::Cone {
                tilt: TiltLimit::Iso(cone_theta),
                sigma_max: None,
            }),
            Self::IsoConeFreeRotor { cone_theta, .. } => Some(Domain::Cone {
                tilt: TiltLimit::Iso(cone_theta),
                sigma_max: Some(PI),
            }),
            Self::PseudoEllipse {
                theta_x,
                theta_y,
                sigma_max,
                ..
            } => Some(Domain::Cone {
                tilt: TiltLimit::Elliptic { theta_x, theta_y },
                sigma_max: Some(sigma_max),
            }),
            Self::PseudoEllipseTorsionless {
                theta_x, theta_y, ..
            } => Some(Domain::Cone {
                tilt: TiltLimit::Elliptic { theta_x, theta_y },
                sigma_max: None,
            }),
            Self::PseudoEllipseFreeRotor {
                theta_x, theta_y, ..
            } => Some(Domain::Cone {
                tilt: TiltLimit::Elliptic { theta_x, theta_y },
                sigma_max: Some(PI),
            }),
            Self::DoubleRotor {
                sigma_max,
                sigma_max_2,
                ..
            } => Some(Domain::DoubleTorsion {
                sigma_max,
                sigma_max_2,
            }),
        }
    }
}

/// Builds the rotor axis from the pivot to centre-of-mass direction.
///
/// The axis is perpendicular to that direction. At `axis_alpha = 0` it points along
/// `unit(n x z)` (or x when `n` is parallel to z) and `axis_alpha` rotates it about `n`.
pub fn create_rotor_axis(
    axis_alpha: f64,
    pivot: &Vector3<f64>,
    com: &Vector3<f64>,
) -> Result<Vector3<f64>, GeometryError> {
    let n = (com - pivot)
        .try_normalize(0.0)
        .ok_or(GeometryError::ZeroLengthVector {
            name: "pivot to centre of mass",
        })?;
    let mu = n
        .cross(&Vector3::z())
        .try_normalize(1e-12)
        .unwrap_or_else(Vector3::x);
    let (sin_a, cos_a) = axis_alpha.sin_cos();
    Ok(cos_a * mu + sin_a * n.cross(&mu))
}
