//! Server-rendered UI shell

use std::sync::LazyLock;

use axum::response::Html;
use serde::Serialize;
use tera::{Context, Tera};

use crate::engine::FormatOption;

static TEMPLATES: LazyLock<Tera> = LazyLock::new(|| {
    let mut tera = Tera::default();
    tera.add_raw_template("index.html", include_str!("../../templates/index.html"))
        .expect("embedded index template is valid");
    tera
});

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashCategory {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct Flash {
    pub category: FlashCategory,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub active_tab: &'static str,
    pub url: String,
    pub formats: Vec<FormatOption>,
    pub waiting: bool,
    pub job_id: Option<String>,
    pub query: String,
    pub count: usize,
    pub flash: Vec<Flash>,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            active_tab: "video",
            url: String::new(),
            formats: Vec::new(),
            waiting: false,
            job_id: None,
            query: String::new(),
            count: 10,
            flash: Vec::new(),
        }
    }
}

impl Page {
    pub fn images() -> Self {
        Self {
            active_tab: "images",
            ..Default::default()
        }
    }

    pub fn flash(mut self, category: FlashCategory, message: impl Into<String>) -> Self {
        self.flash.push(Flash {
            category,
            message: message.into(),
        });
        self
    }

    pub fn render(&self) -> Result<Html<String>, tera::Error> {
        let context = Context::from_serialize(self)?;
        TEMPLATES.render("index.html", &context).map(Html)
    }
}
