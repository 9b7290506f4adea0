pub mod check;
pub mod support_bundle;
pub mod version;
