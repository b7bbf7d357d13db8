pub mod alerts;
pub mod properties;
pub mod searches;
pub mod underwrite;
