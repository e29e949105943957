use super::FrameOrderError;
use crate::core::utils::identifiers::lookup_frame_order_model;
use std::fmt;
use std::str::FromStr;

/// The frame-order motional models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameOrderModel {
    Rigid,
    Rotor,
    FreeRotor,
    IsoCone,
    IsoConeTorsionless,
    IsoConeFreeRotor,
    PseudoEllipse,
    PseudoEllipseTorsionless,
    PseudoEllipseFreeRotor,
    DoubleRotor,
}

const AVE: [&str; 3] = ["ave_pos_alpha", "ave_pos_beta", "ave_pos_gamma"];
const TRANSLATION: [&str; 3] = ["ave_pos_x", "ave_pos_y", "ave_pos_z"];
const PIVOT: [&str; 3] = ["pivot_x", "pivot_y", "pivot_z"];

impl FrameOrderModel {
    pub const ALL: [FrameOrderModel; 10] = [
        Self::Rigid,
        Self::Rotor,
        Self::FreeRotor,
        Self::IsoCone,
        Self::IsoConeTorsionless,
        Self::IsoConeFreeRotor,
        Self::PseudoEllipse,
        Self::PseudoEllipseTorsionless,
        Self::PseudoEllipseFreeRotor,
        Self::DoubleRotor,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Rigid => "rigid",
            Self::Rotor => "rotor",
            Self::FreeRotor => "free_rotor",
            Self::IsoCone => "iso_cone",
            Self::IsoConeTorsionless => "iso_cone_torsionless",
            Self::IsoConeFreeRotor => "iso_cone_free_rotor",
            Self::PseudoEllipse => "pseudo_ellipse",
            Self::PseudoEllipseTorsionless => "pseudo_ellipse_torsionless",
            Self::PseudoEllipseFreeRotor => "pseudo_ellipse_free_rotor",
            Self::DoubleRotor => "double_rotor",
        }
    }

    pub fn is_rigid(&self) -> bool {
        matches!(self, Self::Rigid)
    }

    /// Free-rotor models have no average-position alpha angle.
    pub fn is_free_rotor(&self) -> bool {
        matches!(
            self,
            Self::FreeRotor | Self::IsoConeFreeRotor | Self::PseudoEllipseFreeRotor
        )
    }

    /// Rotor models build their axis from the pivot to centre-of-mass vector.
    pub fn needs_centre_of_mass(&self) -> bool {
        matches!(self, Self::Rotor | Self::FreeRotor)
    }

    /// The model-specific motional parameters, in vector order.
    pub fn motion_param_names(&self) -> &'static [&'static str] {
        match self {
            Self::Rigid => &[],
            Self::Rotor => &["axis_alpha", "cone_sigma_max"],
            Self::FreeRotor => &["axis_alpha"],
            Self::IsoCone => &["axis_theta", "axis_phi", "cone_theta", "cone_sigma_max"],
            Self::IsoConeTorsionless | Self::IsoConeFreeRotor => {
                &["axis_theta", "axis_phi", "cone_theta"]
            }
            Self::PseudoEllipse => &[
                "eigen_alpha",
                "eigen_beta",
                "eigen_gamma",
                "cone_theta_x",
                "cone_theta_y",
                "cone_sigma_max",
            ],
            Self::PseudoEllipseTorsionless | Self::PseudoEllipseFreeRotor => &[
                "eigen_alpha",
                "eigen_beta",
                "eigen_gamma",
                "cone_theta_x",
                "cone_theta_y",
            ],
            Self::DoubleRotor => &[
                "eigen_alpha",
                "eigen_beta",
                "eigen_gamma",
                "cone_sigma_max",
                "cone_sigma_max_2",
            ],
        }
    }

    /// The full ordered parameter names of the flat vector.
    pub fn param_names(&self, pivot_opt: bool) -> Vec<&'static str> {
        let mut names = Vec::with_capacity(self.param_num(pivot_opt));
        if pivot_opt && !self.is_rigid() {
            names.extend(PIVOT);
        }
        if matches!(self, Self::DoubleRotor) {
            names.push("pivot_disp");
        }
        names.extend(TRANSLATION);
        if self.is_free_rotor() {
            names.extend(&AVE[1..]);
        } else {
            names.extend(AVE);
        }
        names.extend(self.motion_param_names());
        names
    }

    /// The number of optimised parameters.
    pub fn param_num(&self, pivot_opt: bool) -> usize {
        let pivot = if pivot_opt && !self.is_rigid() { 3 } else { 0 };
        let disp = usize::from(matches!(self, Self::DoubleRotor));
        let ave = if self.is_free_rotor() { 2 } else { 3 };
        pivot + disp + 3 + ave + self.motion_param_names().len()
    }

    /// The angles sampled by the Sobol' integrator. Empty for the rigid model.
    pub fn sobol_angles(&self) -> &'static [SobolAngle] {
        use SobolAngle::*;
        match self {
            Self::Rigid => &[],
            Self::Rotor | Self::FreeRotor => &[Sigma],
            Self::IsoConeTorsionless | Self::PseudoEllipseTorsionless => &[Theta, Phi],
            Self::IsoCone
            | Self::IsoConeFreeRotor
            | Self::PseudoEllipse
            | Self::PseudoEllipseFreeRotor => &[Theta, Phi, Sigma],
            Self::DoubleRotor => &[Sigma, Sigma2],
        }
    }

    pub fn sobol_dimensions(&self) -> usize {
        self.sobol_angles().len()
    }

    /// Whether the parameter with this name is an angle in `[0, pi]` that bounds the motion.
    pub fn is_amplitude_param(name: &str) -> bool {
        matches!(
            name,
            "cone_theta" | "cone_theta_x" | "cone_theta_y" | "cone_sigma_max" | "cone_sigma_max_2"
        )
    }
}

/// The geometric meaning of a Sobol' dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SobolAngle {
    /// Tilt, `acos(2u - 1)`.
    Theta,
    /// Tilt direction, `2 pi u`.
    Phi,
    /// Torsion, `2 pi (u - 0.5)`.
    Sigma,
    /// Second torsion of the double rotor.
    Sigma2,
}

impl fmt::Display for FrameOrderModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for FrameOrderModel {
    type Err = FrameOrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lookup_frame_order_model(s).ok_or_else(|| FrameOrderError::UnknownModel {
            name: s.to_string(),
        })
    }
}
