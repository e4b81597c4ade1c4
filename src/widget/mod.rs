use std::collections::BTreeMap;
use std::rc::Rc;

use serde::Serialize;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Element, HtmlTextAreaElement};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum WidgetErrorKind {
    /// The configured editor constructor is not on `window`.
    MissingGlobal,
    Call,
    Dom,
}

#[derive(Clone, Debug)]
pub(crate) struct WidgetError {
    pub kind: WidgetErrorKind,
    pub message: String,
}

impl std::fmt::Display for WidgetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl WidgetError {
    fn missing_global(name: &str) -> Self {
        Self {
            kind: WidgetErrorKind::MissingGlobal,
            message: format!("editor global `{name}` is not a constructor"),
        }
    }

    fn call(ctx: &str, e: JsValue) -> Self {
        Self {
            kind: WidgetErrorKind::Call,
            message: format!("{ctx}: {e:?}"),
        }
    }

    fn dom(ctx: &str) -> Self {
        Self {
            kind: WidgetErrorKind::Dom,
            message: ctx.to_string(),
        }
    }
}

pub(crate) type WidgetResult<T> = Result<T, WidgetError>;

/// The per-widget capabilities the editor needs. Everything else about the
/// editing surface (markup mode, keymaps, undo) stays on the widget's side
/// of this seam.
pub(crate) trait EditorWidget {
    fn value(&self) -> String;
    fn focus(&self);
    /// Registers `callback` to run every time the surface gains focus.
    fn on_focus(&self, callback: Box<dyn FnMut()>);
    /// Hook for widgets that need a relayout after their host enters the
    /// document.
    fn refresh(&self) {}
}

pub(crate) trait WidgetFactory {
    /// Builds a widget editing `initial` inside `host` (a `div.textarea`
    /// mount point, possibly still detached from the document).
    fn create(&self, host: &Element, initial: &str) -> WidgetResult<Rc<dyn EditorWidget>>;
}

/// Option object handed to the JS editor constructor (CodeMirror shape).
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WidgetOptions {
    pub value: String,
    pub mode: String,
    pub line_wrapping: bool,
    pub line_numbers: bool,
    pub extra_keys: BTreeMap<String, String>,
}

impl WidgetOptions {
    pub(crate) fn for_mode(mode: &str, value: &str) -> Self {
        let mut extra_keys = BTreeMap::new();
        extra_keys.insert("Tab".to_string(), "indentMore".to_string());
        extra_keys.insert("Shift-Tab".to_string(), "indentLess".to_string());
        extra_keys.insert("Ctrl-K".to_string(), "killLine".to_string());
        Self {
            value: value.to_string(),
            mode: mode.to_string(),
            line_wrapping: true,
            line_numbers: true,
            extra_keys,
        }
    }

    fn to_js(&self) -> WidgetResult<JsValue> {
        let json = serde_json::to_string(self)
            .map_err(|e| WidgetError::dom(&format!("serialize widget options: {e}")))?;
        js_sys::JSON::parse(&json).map_err(|e| WidgetError::call("parse widget options", e))
    }
}

/// Factory bound to a CodeMirror-style constructor on `window`, e.g.
/// `CodeMirror(host, options)`.
pub(crate) struct CodeWidgetFactory {
    constructor: js_sys::Function,
    mode: String,
}

impl CodeWidgetFactory {
    pub(crate) fn from_global(global: &str, mode: &str) -> WidgetResult<Self> {
        let window = web_sys::window().ok_or_else(|| WidgetError::dom("no window"))?;
        let ctor = js_sys::Reflect::get(window.as_ref(), &JsValue::from_str(global))
            .map_err(|e| WidgetError::call("read editor global", e))?;
        let constructor: js_sys::Function = ctor
            .dyn_into()
            .map_err(|_| WidgetError::missing_global(global))?;
        Ok(Self {
            constructor,
            mode: mode.to_string(),
        })
    }
}

impl WidgetFactory for CodeWidgetFactory {
    fn create(&self, host: &Element, initial: &str) -> WidgetResult<Rc<dyn EditorWidget>> {
        let options = WidgetOptions::for_mode(&self.mode, initial).to_js()?;
        let instance = self
            .constructor
            .call2(&JsValue::NULL, host.as_ref(), &options)
            .map_err(|e| WidgetError::call("construct editor widget", e))?;
        Ok(Rc::new(CodeWidget { instance }))
    }
}

/// A live instance of the JS editor widget, driven reflectively.
pub(crate) struct CodeWidget {
    instance: JsValue,
}

impl CodeWidget {
    fn method(&self, name: &str) -> Option<js_sys::Function> {
        js_sys::Reflect::get(&self.instance, &JsValue::from_str(name))
            .ok()
            .and_then(|f| f.dyn_into().ok())
    }

    fn call0(&self, name: &str) -> Option<JsValue> {
        self.method(name)?.call0(&self.instance).ok()
    }
}

impl EditorWidget for CodeWidget {
    fn value(&self) -> String {
        self.call0("getValue")
            .and_then(|v| v.as_string())
            .unwrap_or_default()
    }

    fn focus(&self) {
        let _ = self.call0("focus");
    }

    fn refresh(&self) {
        let _ = self.call0("refresh");
    }

    fn on_focus(&self, mut callback: Box<dyn FnMut()>) {
        let cb = Closure::<dyn FnMut()>::new(move || callback());
        if let Some(on) = self.method("on") {
            let _ = on.call2(&self.instance, &JsValue::from_str("focus"), cb.as_ref());
        }
        // The subscription lives as long as the page.
        cb.forget();
    }
}

/// Plain `<textarea>` surface used when the JS widget is not on the page,
/// so the form stays editable without it.
pub(crate) struct TextareaWidget {
    textarea: HtmlTextAreaElement,
}

pub(crate) struct TextareaWidgetFactory;

impl WidgetFactory for TextareaWidgetFactory {
    fn create(&self, host: &Element, initial: &str) -> WidgetResult<Rc<dyn EditorWidget>> {
        let document = host
            .owner_document()
            .ok_or_else(|| WidgetError::dom("widget host has no document"))?;
        let textarea: HtmlTextAreaElement = document
            .create_element("textarea")
            .map_err(|e| WidgetError::call("create textarea", e))?
            .dyn_into()
            .map_err(|_| WidgetError::dom("created element is not a textarea"))?;
        // No `name` attribute: the hidden input is the one submitted field.
        textarea.set_value(initial);
        host.append_child(textarea.as_ref())
            .map_err(|e| WidgetError::call("attach textarea", e))?;
        Ok(Rc::new(TextareaWidget { textarea }))
    }
}

impl EditorWidget for TextareaWidget {
    fn value(&self) -> String {
        self.textarea.value()
    }

    fn focus(&self) {
        let _ = self.textarea.focus();
    }

    fn on_focus(&self, mut callback: Box<dyn FnMut()>) {
        let cb = Closure::<dyn FnMut()>::new(move || callback());
        let _ = self
            .textarea
            .add_event_listener_with_callback("focus", cb.as_ref().unchecked_ref());
        cb.forget();
    }
}
