mod dom;
mod editor;
mod list;
mod math;
mod widget;

use std::rc::Rc;

use serde::{Deserialize, Serialize};

// Needed for `#[wasm_bindgen(start)]` on the wasm entrypoint.
#[cfg(all(target_arch = "wasm32", not(test)))]
use wasm_bindgen::prelude::wasm_bindgen;

use crate::editor::Editor;
use crate::widget::{CodeWidgetFactory, TextareaWidgetFactory, WidgetErrorKind, WidgetFactory};

/// Editor settings the page can inject as `window.ENV`.
///
/// Both the documented uppercase keys and their lowercase spellings are
/// accepted; every field has a default so a missing or partial `ENV` still
/// boots.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EnvConfig {
    /// Name of the editor constructor on `window`, CodeMirror-shaped:
    /// `Ctor(host, options)`.
    #[serde(
        rename = "EDITOR_GLOBAL",
        alias = "editor_global",
        default = "default_editor_global"
    )]
    pub editor_global: String,

    /// Markup mode handed to the widget.
    #[serde(
        rename = "EDITOR_MODE",
        alias = "editor_mode",
        default = "default_editor_mode"
    )]
    pub editor_mode: String,
}

fn default_editor_global() -> String {
    "CodeMirror".to_string()
}

fn default_editor_mode() -> String {
    "scribblemode".to_string()
}

impl EnvConfig {
    pub fn new() -> Self {
        if let Some(window) = web_sys::window() {
            if let Some(env) = window.get("ENV") {
                if !env.is_undefined() && env.is_object() {
                    if let Ok(json) = js_sys::JSON::stringify(&env) {
                        if let Some(config) = Self::from_json(&String::from(json)) {
                            return config;
                        }
                    }
                }
            }
        }
        Self::default()
    }

    fn from_json(json: &str) -> Option<Self> {
        serde_json::from_str(json).ok()
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            editor_global: default_editor_global(),
            editor_mode: default_editor_mode(),
        }
    }
}

/// Binds the configured JS editor constructor; when the page loads without
/// it, the plain textarea surface keeps the form editable.
fn select_widget_factory(config: &EnvConfig) -> Rc<dyn WidgetFactory> {
    match CodeWidgetFactory::from_global(&config.editor_global, &config.editor_mode) {
        Ok(factory) => Rc::new(factory),
        Err(e) => {
            if e.kind != WidgetErrorKind::MissingGlobal {
                web_sys::console::warn_1(
                    &format!("editor widget unavailable ({e}), using plain textareas").into(),
                );
            }
            Rc::new(TextareaWidgetFactory)
        }
    }
}

// Only register the WASM start function for normal builds (not for tests),
// otherwise wasm-bindgen-test ends up with multiple entry symbols.
#[cfg_attr(all(target_arch = "wasm32", not(test)), wasm_bindgen(start))]
pub fn main() {
    console_error_panic_hook::set_once();

    let Some(document) = web_sys::window().and_then(|w| w.document()) else {
        return;
    };

    // View pages: render math blocks through the katex global.
    math::render_all(&document);

    // Edit pages: take over the block form. The editor value can be dropped;
    // its state lives on in the wired event closures.
    let config = EnvConfig::new();
    let factory = select_widget_factory(&config);
    if let Err(e) = Editor::boot(&document, factory) {
        web_sys::console::error_1(&format!("editor setup failed: {e}").into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_config_defaults_on_empty_object() {
        let parsed = EnvConfig::from_json("{}").expect("empty ENV should parse");
        assert_eq!(parsed.editor_global, "CodeMirror");
        assert_eq!(parsed.editor_mode, "scribblemode");
    }

    #[test]
    fn test_env_config_reads_documented_keys() {
        let parsed = EnvConfig::from_json(
            r#"{"EDITOR_GLOBAL": "ScribbleMirror", "EDITOR_MODE": "markdown"}"#,
        )
        .expect("ENV should parse");
        assert_eq!(parsed.editor_global, "ScribbleMirror");
        assert_eq!(parsed.editor_mode, "markdown");
    }

    #[test]
    fn test_env_config_accepts_lowercase_aliases() {
        let parsed = EnvConfig::from_json(r#"{"editor_global": "Cm6"}"#).expect("should parse");
        assert_eq!(parsed.editor_global, "Cm6");
        assert_eq!(parsed.editor_mode, "scribblemode");
    }

    #[test]
    fn test_env_config_ignores_unknown_keys() {
        let parsed =
            EnvConfig::from_json(r#"{"API_URL": "http://localhost:6689"}"#).expect("should parse");
        assert_eq!(parsed, EnvConfig::default());
    }
}
