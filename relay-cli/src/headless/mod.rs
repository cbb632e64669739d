pub mod app;
pub mod approval;
pub mod schemas;
