pub mod cors;
pub mod preflight;

pub use cors::create_cors_layer;
pub use preflight::reject_bare_options;
