//! Contract rendering through Tera.
//!
//! Templates are loaded from a directory at startup. The stock contract
//! template is compiled in and used whenever the directory does not provide
//! one under the same name.

use std::error::Error as _;
use std::path::Path;

use tera::{Context, Tera};
use tracing::{info, warn};

use freightq_core::contract::DEFAULT_CONTRACT_TEMPLATE;
use freightq_core::ports::{RenderContext, RenderError, TemplateRenderer};

use crate::filters::register_template_filters;

const EMBEDDED_CONTRACT: &str = include_str!("../../../templates/contracts/contract.html.tera");

#[derive(Clone, Debug)]
pub struct TeraRenderer {
    tera: Tera,
}

impl TeraRenderer {
    /// Loads every template under `template_dir`. A missing directory
    /// yields an empty renderer rather than an error.
    pub fn from_dir(template_dir: impl AsRef<Path>) -> Result<Self, RenderError> {
        let template_dir = template_dir.as_ref();
        let mut tera = if template_dir.is_dir() {
            let glob = format!("{}/**/*.tera", template_dir.display());
            Tera::new(&glob).map_err(|error| RenderError::Failed {
                template: template_dir.display().to_string(),
                message: error_chain(&error),
            })?
        } else {
            warn!(
                event_name = "render.template_dir_missing",
                template_dir = %template_dir.display(),
                "template directory not found"
            );
            Tera::default()
        };
        configure(&mut tera);
        Ok(Self { tera })
    }

    /// Stock contract template only.
    pub fn with_embedded_templates() -> Result<Self, RenderError> {
        let mut tera = Tera::default();
        configure(&mut tera);
        let mut renderer = Self { tera };
        renderer.add_embedded_contract()?;
        Ok(renderer)
    }

    /// Directory templates, plus the stock contract when the directory lacks it.
    pub fn load(template_dir: impl AsRef<Path>) -> Result<Self, RenderError> {
        let mut renderer = Self::from_dir(template_dir)?;
        if !renderer.has_template(DEFAULT_CONTRACT_TEMPLATE) {
            renderer.add_embedded_contract()?;
        }
        info!(
            event_name = "render.templates_loaded",
            templates = renderer.template_names().len(),
            "templates loaded"
        );
        Ok(renderer)
    }

    fn add_embedded_contract(&mut self) -> Result<(), RenderError> {
        self.tera.add_raw_template(DEFAULT_CONTRACT_TEMPLATE, EMBEDDED_CONTRACT).map_err(|error| {
            RenderError::Failed {
                template: DEFAULT_CONTRACT_TEMPLATE.to_owned(),
                message: error_chain(&error),
            }
        })
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|candidate| candidate == name)
    }

    pub fn template_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tera.get_template_names().map(str::to_owned).collect();
        names.sort();
        names
    }
}

fn configure(tera: &mut Tera) {
    tera.autoescape_on(vec![".html", ".htm", ".html.tera", ".htm.tera"]);
    register_template_filters(tera);
}

/// Tera nests the useful message in the error source chain.
fn error_chain(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

impl TemplateRenderer for TeraRenderer {
    fn render(&self, template_ref: &str, context: &RenderContext) -> Result<Vec<u8>, RenderError> {
        if !self.has_template(template_ref) {
            return Err(RenderError::TemplateMissing(template_ref.to_owned()));
        }

        let mut tera_context = Context::new();
        for (key, value) in context {
            tera_context.insert(key.as_str(), value);
        }

        self.tera
            .render(template_ref, &tera_context)
            .map(String::into_bytes)
            .map_err(|error| RenderError::Failed {
                template: template_ref.to_owned(),
                message: error_chain(&error),
            })
    }
}
