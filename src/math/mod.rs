use wasm_bindgen::{JsCast, JsValue};
use web_sys::Document;

/// Shorthand macros shared with the server-side markup: `\N` renders as
/// `\mathbb{N}` and so on.
fn macros() -> serde_json::Value {
    serde_json::json!({
        "\\N": "\\mathbb{N}",
        "\\Z": "\\mathbb{Z}",
        "\\Q": "\\mathbb{Q}",
        "\\R": "\\mathbb{R}",
        "\\C": "\\mathbb{C}",
        "\\F": "\\mathbb{F}",
    })
}

/// Options for `katex.render`. Rendering must never throw into the page;
/// katex falls back to showing the raw TeX on error.
pub(crate) fn render_options(display_mode: bool) -> serde_json::Value {
    serde_json::json!({
        "displayMode": display_mode,
        "throwOnError": false,
        "macros": macros(),
    })
}

fn katex_render() -> Option<(JsValue, js_sys::Function)> {
    let window = web_sys::window()?;
    let katex = js_sys::Reflect::get(window.as_ref(), &JsValue::from_str("katex")).ok()?;
    if !katex.is_object() {
        return None;
    }
    let render: js_sys::Function = js_sys::Reflect::get(&katex, &JsValue::from_str("render"))
        .ok()?
        .dyn_into()
        .ok()?;
    Some((katex, render))
}

/// Renders every `div.math` block through the page's katex global. View
/// pages without math, and pages loaded without katex, are left untouched.
pub(crate) fn render_all(document: &Document) {
    let Some((katex, render)) = katex_render() else {
        return;
    };
    let Ok(nodes) = document.query_selector_all("div.math") else {
        return;
    };
    for index in 0..nodes.length() {
        let Some(element) = nodes
            .item(index)
            .and_then(|n| n.dyn_into::<web_sys::Element>().ok())
        else {
            continue;
        };
        let Some(tex) = element.get_attribute("data-tex") else {
            continue;
        };
        let display_mode = element.class_list().contains("tex-display");
        let Ok(options) = js_sys::JSON::parse(&render_options(display_mode).to_string()) else {
            continue;
        };
        let _ = render.call3(
            &katex,
            &JsValue::from_str(&tex),
            element.as_ref(),
            &options,
        );
    }
}
