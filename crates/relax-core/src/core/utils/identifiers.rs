use crate::core::dispersion::DispersionModel;
use crate::core::frame_order::model::FrameOrderModel;
use crate::core::model_free::params::MfParam;
use phf::{Map, phf_map};

static FRAME_ORDER_MODELS: Map<&'static str, FrameOrderModel> = phf_map! {
    "rigid" => FrameOrderModel::Rigid,
    "rotor" => FrameOrderModel::Rotor,
    "free_rotor" => FrameOrderModel::FreeRotor,
    "iso_cone" => FrameOrderModel::IsoCone,
    "iso_cone_torsionless" => FrameOrderModel::IsoConeTorsionless,
    "iso_cone_free_rotor" => FrameOrderModel::IsoConeFreeRotor,
    "pseudo_ellipse" => FrameOrderModel::PseudoEllipse,
    "pseudo_ellipse_torsionless" => FrameOrderModel::PseudoEllipseTorsionless,
    "pseudo_ellipse_free_rotor" => FrameOrderModel::PseudoEllipseFreeRotor,
    "double_rotor" => FrameOrderModel::DoubleRotor,
};

static DISPERSION_MODELS: Map<&'static str, DispersionModel> = phf_map! {
    "no_rex" => DispersionModel::NoRex,
    "lm63" => DispersionModel::Lm63,
    "cr72" => DispersionModel::Cr72,
    "cr72_full" => DispersionModel::Cr72,
    "cr72_red" => DispersionModel::Cr72Red,
    "dpl94" => DispersionModel::Dpl94,
};

static MODEL_FREE_PARAMS: Map<&'static str, MfParam> = phf_map! {
    "local_tm" => MfParam::LocalTm,
    "s2" => MfParam::S2,
    "s2f" => MfParam::S2f,
    "s2s" => MfParam::S2s,
    "te" => MfParam::Te,
    "tf" => MfParam::Tf,
    "ts" => MfParam::Ts,
    "rex" => MfParam::Rex,
    "r" => MfParam::R,
    "csa" => MfParam::Csa,
};

static MODEL_FREE_MODELS: Map<&'static str, &'static [MfParam]> = phf_map! {
    "m0" => &[],
    "m1" => &[MfParam::S2],
    "m2" => &[MfParam::S2, MfParam::Te],
    "m3" => &[MfParam::S2, MfParam::Rex],
    "m4" => &[MfParam::S2, MfParam::Te, MfParam::Rex],
    "m5" => &[MfParam::S2f, MfParam::S2, MfParam::Ts],
    "m6" => &[MfParam::S2f, MfParam::Tf, MfParam::S2, MfParam::Ts],
    "m7" => &[MfParam::S2f, MfParam::S2, MfParam::Ts, MfParam::Rex],
    "m8" => &[MfParam::S2f, MfParam::Tf, MfParam::S2, MfParam::Ts, MfParam::Rex],
    "m9" => &[MfParam::Rex],
    "tm0" => &[MfParam::LocalTm],
    "tm1" => &[MfParam::LocalTm, MfParam::S2],
    "tm2" => &[MfParam::LocalTm, MfParam::S2, MfParam::Te],
    "tm3" => &[MfParam::LocalTm, MfParam::S2, MfParam::Rex],
    "tm4" => &[MfParam::LocalTm, MfParam::S2, MfParam::Te, MfParam::Rex],
    "tm5" => &[MfParam::LocalTm, MfParam::S2f, MfParam::S2, MfParam::Ts],
    "tm6" => &[MfParam::LocalTm, MfParam::S2f, MfParam::Tf, MfParam::S2, MfParam::Ts],
    "tm7" => &[MfParam::LocalTm, MfParam::S2f, MfParam::S2, MfParam::Ts, MfParam::Rex],
    "tm8" => &[MfParam::LocalTm, MfParam::S2f, MfParam::Tf, MfParam::S2, MfParam::Ts, MfParam::Rex],
    "tm9" => &[MfParam::LocalTm, MfParam::Rex],
};

/// Lower-cases a user-supplied identifier and folds spaces and hyphens into underscores.
pub fn normalize_identifier(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

pub fn lookup_frame_order_model(name: &str) -> Option<FrameOrderModel> {
    FRAME_ORDER_MODELS.get(normalize_identifier(name).as_str()).copied()
}

pub fn lookup_dispersion_model(name: &str) -> Option<DispersionModel> {
    DISPERSION_MODELS.get(normalize_identifier(name).as_str()).copied()
}

pub fn lookup_model_free_param(name: &str) -> Option<MfParam> {
    MODEL_FREE_PARAMS.get(normalize_identifier(name).as_str()).copied()
}

/// The parameter list of a named model-free model (`m0` to `m9`, `tm0` to `tm9`).
pub fn model_free_model_params(name: &str) -> Option<&'static [MfParam]> {
    MODEL_FREE_MODELS.get(normalize_identifier(name).as_str()).copied()
}
