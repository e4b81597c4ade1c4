use wasm_bindgen::JsValue;
use web_sys::{Document, Element};

/// Creates an element with the given attributes already set.
pub(crate) fn create_element_with_attrs(
    document: &Document,
    name: &str,
    attrs: &[(&str, &str)],
) -> Result<Element, JsValue> {
    let element = document.create_element(name)?;
    for (key, value) in attrs {
        element.set_attribute(key, value)?;
    }
    Ok(element)
}

/// Toggles the `selected` class the page stylesheet uses to highlight the
/// active block.
pub(crate) fn set_selected_style(element: &Element, selected: bool) {
    let class_list = element.class_list();
    if selected {
        let _ = class_list.add_1("selected");
    } else {
        let _ = class_list.remove_1("selected");
    }
}
