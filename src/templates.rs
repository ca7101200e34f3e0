use std::sync::OnceLock;
use tera::Tera;

static TERA: OnceLock<Tera> = OnceLock::new();

/// Loads every `*.html` under `dir` the first time it is called. Later calls
/// return the same instance whatever `dir` they pass.
pub fn init(dir: &std::path::Path) -> &'static Tera {
    TERA.get_or_init(|| {
        let pattern = format!("{}/**/*.html", dir.display());
        match Tera::new(&pattern) {
            Ok(tera) => tera,
            Err(e) => {
                tracing::error!("Failed to load templates from {}: {}", dir.display(), e);
                Tera::default()
            }
        }
    })
}

pub fn get_tera() -> &'static Tera {
    init(std::path::Path::new("templates"))
}
