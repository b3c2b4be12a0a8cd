pub mod filters;
pub mod renderer;

pub use filters::register_template_filters;
pub use renderer::TeraRenderer;
