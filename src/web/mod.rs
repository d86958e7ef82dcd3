//! Page rendering
//!
//! The form page is a single Jinja template rendered with an optional
//! `success` or `error` message. Templates load from a directory at startup
//! (or from a string in tests) through `minijinja`.

pub mod assets;

pub use assets::StaticAssets;

use minijinja::{context, path_loader, Environment};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Template errors
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Template directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("Template error: {0}")]
    Render(#[from] minijinja::Error),
}

/// Message shown on the form page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMessage<'a> {
    /// Plain form, nothing submitted yet
    Empty,
    Success(&'a str),
    Error(&'a str),
}

/// Renders the form page
pub struct PageRenderer {
    env: Environment<'static>,
    page: String,
}

impl PageRenderer {
    /// Load templates from `dir` and check that `page` compiles
    pub fn from_dir(dir: impl AsRef<Path>, page: impl Into<String>) -> Result<Self, TemplateError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(TemplateError::MissingDirectory(dir.to_path_buf()));
        }

        let mut env = Environment::new();
        env.set_loader(path_loader(dir));

        let renderer = Self {
            env,
            page: page.into(),
        };
        renderer.env.get_template(&renderer.page)?;
        Ok(renderer)
    }

    /// Build a renderer from an in-memory template
    pub fn from_source(
        page: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<Self, TemplateError> {
        let page = page.into();
        let mut env = Environment::new();
        env.add_template_owned(page.clone(), source.into())?;
        Ok(Self { env, page })
    }

    /// Render the page with an optional message
    pub fn render(&self, message: PageMessage<'_>) -> Result<String, TemplateError> {
        let (success, error) = match message {
            PageMessage::Empty => (None, None),
            PageMessage::Success(text) => (Some(text), None),
            PageMessage::Error(text) => (None, Some(text)),
        };

        let template = self.env.get_template(&self.page)?;
        Ok(template.render(context! { success => success, error => error })?)
    }
}
