use std::cell::RefCell;
use std::rc::Rc;

use strum::IntoEnumIterator;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, Element, HtmlButtonElement, HtmlInputElement, HtmlTextAreaElement};

use crate::dom::{create_element_with_attrs, set_selected_style};
use crate::list::{ItemId, ItemList, MoveOutcome};
use crate::widget::{EditorWidget, WidgetError, WidgetFactory};

#[derive(Clone, Debug)]
pub(crate) struct EditorError {
    message: String,
}

impl std::fmt::Display for EditorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl EditorError {
    fn template(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }

    fn js(ctx: &str, e: JsValue) -> Self {
        Self {
            message: format!("{ctx}: {e:?}"),
        }
    }
}

impl From<WidgetError> for EditorError {
    fn from(e: WidgetError) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}

pub(crate) type EditorResult<T> = Result<T, EditorError>;

/// The four toolbar controls, addressed by their ids in the page template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::AsRefStr, strum::EnumIter)]
pub(crate) enum ToolbarButton {
    #[strum(serialize = "btn-add")]
    Add,
    #[strum(serialize = "btn-up")]
    MoveUp,
    #[strum(serialize = "btn-down")]
    MoveDown,
    #[strum(serialize = "btn-delete")]
    Delete,
}

impl ToolbarButton {
    /// Buttons that only make sense while a block is selected.
    fn needs_selection(self) -> bool {
        !matches!(self, ToolbarButton::Add)
    }
}

pub(crate) struct Toolbar {
    buttons: Vec<(ToolbarButton, HtmlButtonElement)>,
}

impl Toolbar {
    /// Collects the toolbar buttons from the page. `None` when any of them
    /// is missing (the template does not carry an editor toolbar).
    fn from_document(document: &Document) -> Option<Self> {
        let mut buttons = Vec::new();
        for button in ToolbarButton::iter() {
            let element: HtmlButtonElement = document
                .get_element_by_id(button.as_ref())?
                .dyn_into()
                .ok()?;
            buttons.push((button, element));
        }
        Some(Self { buttons })
    }

    fn get(&self, which: ToolbarButton) -> &HtmlButtonElement {
        &self
            .buttons
            .iter()
            .find(|(button, _)| *button == which)
            .expect("toolbar holds all four buttons")
            .1
    }

    fn set_selection_controls_enabled(&self, enabled: bool) {
        for (button, element) in &self.buttons {
            if button.needs_selection() {
                element.set_disabled(!enabled);
            }
        }
    }
}

/// One text block: its editing widget plus the DOM subtree it lives in.
/// The container holds the widget mount and the hidden input the server
/// reads back on submit.
pub(crate) struct Block {
    widget: Rc<dyn EditorWidget>,
    container: Element,
    hidden: HtmlInputElement,
}

struct EditorState {
    blocks: ItemList<Block>,
    selected: Option<ItemId>,
    toolbar: Toolbar,
    textboxes: Element,
    factory: Rc<dyn WidgetFactory>,
}

/// Synchronizes the block list, the live DOM and the selection.
///
/// Cloning shares the state; the clones wired into event closures keep the
/// editor alive after boot returns.
#[derive(Clone)]
pub(crate) struct Editor {
    state: Rc<RefCell<EditorState>>,
}

impl Editor {
    /// Takes over the server-rendered edit form. Returns `Ok(None)` when the
    /// document has no block container (not an edit page), leaving the plain
    /// form behavior in place.
    pub(crate) fn boot(
        document: &Document,
        factory: Rc<dyn WidgetFactory>,
    ) -> EditorResult<Option<Editor>> {
        let Some(textboxes) = document.get_element_by_id("textboxes") else {
            return Ok(None);
        };
        let toolbar = Toolbar::from_document(document)
            .ok_or_else(|| EditorError::template("toolbar buttons missing from edit page"))?;
        toolbar.set_selection_controls_enabled(false);

        let editor = Editor {
            state: Rc::new(RefCell::new(EditorState {
                blocks: ItemList::new(),
                selected: None,
                toolbar,
                textboxes,
                factory,
            })),
        };
        editor.adopt_rendered_blocks(document)?;
        editor.wire_toolbar();
        editor.wire_submit(document)?;
        Ok(Some(editor))
    }

    /// Converts the blocks the server rendered into list items, in document
    /// order: each `div.textarea` mount gets a widget seeded from the no-JS
    /// fallback textarea it replaces, plus the hidden input submit fills.
    fn adopt_rendered_blocks(&self, document: &Document) -> EditorResult<()> {
        let hosts = {
            let state = self.state.borrow();
            state
                .textboxes
                .query_selector_all("div.textarea")
                .map_err(|e| EditorError::js("query widget mounts", e))?
        };
        let factory = self.state.borrow().factory.clone();

        for index in 0..hosts.length() {
            let Some(host) = hosts.item(index).and_then(|n| n.dyn_into::<Element>().ok()) else {
                continue;
            };
            let Some(container) = host.parent_element() else {
                continue;
            };
            let fallback = container
                .query_selector("textarea")
                .ok()
                .flatten()
                .and_then(|t| t.dyn_into::<HtmlTextAreaElement>().ok());
            let text = fallback.as_ref().map(|t| t.value()).unwrap_or_default();

            let widget = factory.create(&host, &text)?;
            if let Some(fallback) = fallback {
                fallback.remove();
            }

            let hidden = hidden_text_input(document)?;
            container
                .append_child(hidden.as_ref())
                .map_err(|e| EditorError::js("attach hidden input", e))?;
            let _ = host.class_list().remove_1("visually-hidden");

            let id = self.state.borrow_mut().blocks.append(Block {
                widget: Rc::clone(&widget),
                container,
                hidden,
            });
            self.watch_focus(id, &widget);
            widget.refresh();
        }
        Ok(())
    }

    /// Focus on any block's widget selects that block.
    fn watch_focus(&self, id: ItemId, widget: &Rc<dyn EditorWidget>) {
        let state = Rc::clone(&self.state);
        widget.on_focus(Box::new(move || on_block_focused(&state, id)));
    }

    fn wire_toolbar(&self) {
        for button in ToolbarButton::iter() {
            let element = self.state.borrow().toolbar.get(button).clone();
            let editor = self.clone();
            let closure = Closure::<dyn FnMut()>::new(move || editor.dispatch(button));
            let _ = element.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref());
            closure.forget();
        }
    }

    /// Before the form posts, copy every widget's current text into its
    /// hidden field so the server receives the blocks in list order. The
    /// submit itself always proceeds.
    fn wire_submit(&self, document: &Document) -> EditorResult<()> {
        let form = document
            .get_element_by_id("form")
            .ok_or_else(|| EditorError::template("edit form missing from edit page"))?;
        let state = Rc::clone(&self.state);
        let closure = Closure::<dyn FnMut()>::new(move || {
            let state = state.borrow();
            for block in state.blocks.iter() {
                block.hidden.set_value(&block.widget.value());
            }
        });
        let _ = form.add_event_listener_with_callback("submit", closure.as_ref().unchecked_ref());
        closure.forget();
        Ok(())
    }

    fn dispatch(&self, button: ToolbarButton) {
        let result = match button {
            ToolbarButton::Add => self.on_add(),
            ToolbarButton::MoveUp => {
                self.on_move_up();
                Ok(())
            }
            ToolbarButton::MoveDown => {
                self.on_move_down();
                Ok(())
            }
            ToolbarButton::Delete => {
                self.on_delete();
                Ok(())
            }
        };
        if let Err(e) = result {
            web_sys::console::error_1(&format!("toolbar action failed: {e}").into());
        }
    }

    /// Inserts a fresh empty block after the selected one, falling back to
    /// the end of the page when nothing is selected, then hands it focus.
    pub(crate) fn on_add(&self) -> EditorResult<()> {
        let widget;
        {
            let mut state = self.state.borrow_mut();
            let document = state
                .textboxes
                .owner_document()
                .ok_or_else(|| EditorError::template("block container is not in a document"))?;

            let container = create_element_with_attrs(
                &document,
                "div",
                &[("class", "textbox-container")],
            )
            .map_err(|e| EditorError::js("create block container", e))?;
            let hidden = hidden_text_input(&document)?;
            let host = create_element_with_attrs(&document, "div", &[("class", "textarea")])
                .map_err(|e| EditorError::js("create widget mount", e))?;
            container
                .append_child(hidden.as_ref())
                .map_err(|e| EditorError::js("attach hidden input", e))?;
            container
                .append_child(host.as_ref())
                .map_err(|e| EditorError::js("attach widget mount", e))?;

            widget = state.factory.create(&host, "")?;

            let reference = state.selected;
            let id = state.blocks.append(Block {
                widget: Rc::clone(&widget),
                container: container.clone(),
                hidden,
            });
            match reference {
                Some(reference) => {
                    // "Add" means insert after the selected block: re-splice
                    // the fresh entry from the back to its place, and mirror
                    // the same reorder on the containers.
                    state.blocks.detach(id);
                    state.blocks.insert_after(Some(reference), id);
                    let anchor = &state.blocks.get(reference).container;
                    anchor
                        .insert_adjacent_element("afterend", &container)
                        .map_err(|e| EditorError::js("insert block container", e))?;
                }
                None => {
                    state
                        .textboxes
                        .append_child(container.as_ref())
                        .map_err(|e| EditorError::js("append block container", e))?;
                }
            }
            self.watch_focus(id, &widget);
        }
        // Focus after the borrow is released: the focus event re-enters the
        // selection handler.
        widget.refresh();
        widget.focus();
        Ok(())
    }

    pub(crate) fn on_move_up(&self) {
        let mut state = self.state.borrow_mut();
        let Some(id) = state.selected else {
            return;
        };
        let outcome = state.blocks.move_up(id);
        mirror_move(&state, id, outcome);
    }

    pub(crate) fn on_move_down(&self) {
        let mut state = self.state.borrow_mut();
        let Some(id) = state.selected else {
            return;
        };
        let outcome = state.blocks.move_down(id);
        mirror_move(&state, id, outcome);
    }

    /// Removes the selected block, handing focus to the next block when one
    /// exists, else the previous; deleting the last block clears the
    /// selection and disables the selection controls.
    pub(crate) fn on_delete(&self) {
        let successor;
        {
            let mut state = self.state.borrow_mut();
            let Some(id) = state.selected else {
                return;
            };
            let neighbor = state.blocks.next(id).or_else(|| state.blocks.prev(id));
            successor = neighbor.map(|n| Rc::clone(&state.blocks.get(n).widget));
            if successor.is_none() {
                state.toolbar.set_selection_controls_enabled(false);
            }
            // Clear before removing so the focus handler never sees the
            // freed handle as the previous selection.
            state.selected = None;
            let block = state.blocks.remove(id);
            block.container.remove();
        }
        if let Some(widget) = successor {
            widget.focus();
        }
    }
}

/// Replays a list move on the containers and keeps the moved block visible.
/// A `NoOp` changes nothing, not even the scroll position.
fn mirror_move(state: &EditorState, id: ItemId, outcome: MoveOutcome) {
    let container = &state.blocks.get(id).container;
    match outcome {
        MoveOutcome::NoOp => return,
        MoveOutcome::MovedToFront => {
            // insertAdjacentElement relocates an already-attached node.
            let _ = state.textboxes.insert_adjacent_element("afterbegin", container);
        }
        MoveOutcome::MovedAfter(target) => {
            let _ = state
                .blocks
                .get(target)
                .container
                .insert_adjacent_element("afterend", container);
        }
    }
    container.scroll_into_view();
}

fn on_block_focused(state: &Rc<RefCell<EditorState>>, id: ItemId) {
    let mut state = state.borrow_mut();
    if state.selected == Some(id) {
        return;
    }
    if let Some(previous) = state.selected {
        set_selected_style(&state.blocks.get(previous).container, false);
    }
    state.selected = Some(id);
    set_selected_style(&state.blocks.get(id).container, true);
    state.toolbar.set_selection_controls_enabled(true);
}

fn hidden_text_input(document: &Document) -> EditorResult<HtmlInputElement> {
    create_element_with_attrs(document, "input", &[("type", "hidden"), ("name", "text")])
        .map_err(|e| EditorError::js("create hidden input", e))?
        .dyn_into()
        .map_err(|_| EditorError::template("created element is not an input"))
}


// Browser tests (run with `cargo test --target wasm32-unknown-unknown` +
// wasm-bindgen-test-runner). They drive the editor against a real DOM with
// the plain textarea widget.
#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use crate::widget::TextareaWidgetFactory;
    use wasm_bindgen_test::*;
    use web_sys::Event;

    wasm_bindgen_test_configure!(run_in_browser);

    fn document() -> Document {
        web_sys::window()
            .expect("window")
            .document()
            .expect("document")
    }

    fn block_markup(text: &str) -> String {
        format!(
            "<div class=\"textbox-container\">\
             <textarea name=\"text\">{text}</textarea>\
             <div class=\"textarea visually-hidden\"></div>\
             </div>"
        )
    }

    fn install_fixture(texts: &[&str]) -> (Document, Editor) {
        let document = document();
        let body = document.body().expect("body");
        let blocks: String = texts.iter().map(|t| block_markup(t)).collect();
        body.set_inner_html(&format!(
            "<button id=\"btn-add\" type=\"button\">Add</button>\
             <button id=\"btn-up\" type=\"button\">Up</button>\
             <button id=\"btn-down\" type=\"button\">Down</button>\
             <button id=\"btn-delete\" type=\"button\">Delete</button>\
             <form id=\"form\"><div id=\"textboxes\">{blocks}</div></form>"
        ));
        let editor = Editor::boot(&document, Rc::new(TextareaWidgetFactory))
            .expect("boot should succeed")
            .expect("fixture is an edit page");
        (document, editor)
    }

    fn widget_textareas(document: &Document) -> Vec<HtmlTextAreaElement> {
        let nodes = document
            .query_selector_all("#textboxes .textarea textarea")
            .expect("query widgets");
        (0..nodes.length())
            .filter_map(|i| nodes.item(i)?.dyn_into().ok())
            .collect()
    }

    fn visible_texts(document: &Document) -> Vec<String> {
        widget_textareas(document).iter().map(|t| t.value()).collect()
    }

    fn hidden_values(document: &Document) -> Vec<String> {
        let nodes = document
            .query_selector_all("#textboxes input[name='text']")
            .expect("query hidden inputs");
        (0..nodes.length())
            .filter_map(|i| nodes.item(i)?.dyn_into::<HtmlInputElement>().ok())
            .map(|input| input.value())
            .collect()
    }

    /// Selects a block the way the page does: via a focus event on its
    /// widget surface. Dispatched manually so the test does not depend on
    /// the window holding real input focus.
    fn select_block(document: &Document, index: usize) {
        let textareas = widget_textareas(document);
        let event = Event::new("focus").expect("focus event");
        textareas[index].dispatch_event(&event).expect("dispatch focus");
    }

    fn button(document: &Document, id: &str) -> HtmlButtonElement {
        document
            .get_element_by_id(id)
            .expect("button")
            .dyn_into()
            .expect("button element")
    }

    fn submit(document: &Document) {
        let form = document.get_element_by_id("form").expect("form");
        let event = Event::new("submit").expect("submit event");
        form.dispatch_event(&event).expect("dispatch submit");
    }

    #[wasm_bindgen_test]
    fn test_boot_adopts_blocks_in_document_order() {
        let (document, _editor) = install_fixture(&["A", "B", "C"]);
        assert_eq!(visible_texts(&document), vec!["A", "B", "C"]);

        // The no-JS fallback textareas are gone; only widget surfaces remain.
        let fallbacks = document
            .query_selector_all("#textboxes textarea[name='text']")
            .expect("query fallbacks");
        assert_eq!(fallbacks.length(), 0);
        let hidden = hidden_values(&document);
        assert_eq!(hidden.len(), 3);

        // Mounts are revealed, nothing is selected yet.
        assert!(document
            .query_selector(".visually-hidden")
            .expect("query")
            .is_none());
        assert!(button(&document, "btn-up").disabled());
        assert!(button(&document, "btn-down").disabled());
        assert!(button(&document, "btn-delete").disabled());
        assert!(!button(&document, "btn-add").disabled());
    }

    #[wasm_bindgen_test]
    fn test_boot_skips_documents_without_block_container() {
        let document = document();
        document.body().expect("body").set_inner_html("<p>view page</p>");
        let booted = Editor::boot(&document, Rc::new(TextareaWidgetFactory))
            .expect("boot should succeed");
        assert!(booted.is_none());
    }

    #[wasm_bindgen_test]
    fn test_focus_selects_block_and_enables_controls() {
        let (document, _editor) = install_fixture(&["A", "B"]);
        select_block(&document, 1);

        let containers = document
            .query_selector_all("#textboxes .textbox-container")
            .expect("containers");
        let first: Element = containers.item(0).unwrap().dyn_into().unwrap();
        let second: Element = containers.item(1).unwrap().dyn_into().unwrap();
        assert!(!first.class_list().contains("selected"));
        assert!(second.class_list().contains("selected"));
        assert!(!button(&document, "btn-up").disabled());
        assert!(!button(&document, "btn-delete").disabled());

        // Selecting another block moves the highlight.
        select_block(&document, 0);
        assert!(first.class_list().contains("selected"));
        assert!(!second.class_list().contains("selected"));
    }

    #[wasm_bindgen_test]
    fn test_add_without_selection_appends_block() {
        let (document, editor) = install_fixture(&["A"]);
        editor.on_add().expect("add should succeed");
        assert_eq!(visible_texts(&document), vec!["A", ""]);
        // Every block carries its hidden field.
        assert_eq!(hidden_values(&document).len(), 2);
    }

    #[wasm_bindgen_test]
    fn test_add_after_selected_inserts_between() {
        let (document, editor) = install_fixture(&["A", "B", "C"]);
        select_block(&document, 1);
        editor.on_add().expect("add should succeed");
        assert_eq!(visible_texts(&document), vec!["A", "B", "", "C"]);
    }

    #[wasm_bindgen_test]
    fn test_add_focuses_new_widget() {
        let (document, editor) = install_fixture(&["A"]);
        editor.on_add().expect("add should succeed");
        let new_widget = widget_textareas(&document)[1].clone();
        assert_eq!(document.active_element(), Some(new_widget.into()));
    }

    #[wasm_bindgen_test]
    fn test_move_up_reorders_dom_until_front() {
        let (document, _editor) = install_fixture(&["A", "B", "C"]);
        select_block(&document, 2);

        button(&document, "btn-up").click();
        assert_eq!(visible_texts(&document), vec!["A", "C", "B"]);

        button(&document, "btn-up").click();
        assert_eq!(visible_texts(&document), vec!["C", "A", "B"]);

        // Already at the front: nothing changes.
        button(&document, "btn-up").click();
        assert_eq!(visible_texts(&document), vec!["C", "A", "B"]);
    }

    #[wasm_bindgen_test]
    fn test_move_down_reorders_dom_until_back() {
        let (document, _editor) = install_fixture(&["A", "B"]);
        select_block(&document, 0);

        button(&document, "btn-down").click();
        assert_eq!(visible_texts(&document), vec!["B", "A"]);

        button(&document, "btn-down").click();
        assert_eq!(visible_texts(&document), vec!["B", "A"]);
    }

    #[wasm_bindgen_test]
    fn test_delete_middle_block_focuses_next() {
        let (document, _editor) = install_fixture(&["A", "B", "C"]);
        select_block(&document, 1);
        button(&document, "btn-delete").click();

        assert_eq!(visible_texts(&document), vec!["A", "C"]);
        let next = widget_textareas(&document)[1].clone();
        assert_eq!(document.active_element(), Some(next.into()));

        submit(&document);
        assert_eq!(hidden_values(&document), vec!["A", "C"]);
    }

    #[wasm_bindgen_test]
    fn test_delete_back_block_focuses_previous() {
        let (document, _editor) = install_fixture(&["A", "B"]);
        select_block(&document, 1);
        button(&document, "btn-delete").click();

        assert_eq!(visible_texts(&document), vec!["A"]);
        let previous = widget_textareas(&document)[0].clone();
        assert_eq!(document.active_element(), Some(previous.into()));
    }

    #[wasm_bindgen_test]
    fn test_delete_only_block_clears_selection_and_disables_controls() {
        let (document, _editor) = install_fixture(&["A"]);
        select_block(&document, 0);
        button(&document, "btn-delete").click();

        assert_eq!(visible_texts(&document), Vec::<String>::new());
        assert!(button(&document, "btn-up").disabled());
        assert!(button(&document, "btn-down").disabled());
        assert!(button(&document, "btn-delete").disabled());
        assert!(!button(&document, "btn-add").disabled());
    }

    #[wasm_bindgen_test]
    fn test_delete_without_selection_is_noop() {
        let (document, editor) = install_fixture(&["A"]);
        editor.on_delete();
        assert_eq!(visible_texts(&document), vec!["A"]);
    }

    #[wasm_bindgen_test]
    fn test_move_without_selection_is_noop() {
        let (document, editor) = install_fixture(&["A", "B"]);
        editor.on_move_up();
        editor.on_move_down();
        assert_eq!(visible_texts(&document), vec!["A", "B"]);
    }

    #[wasm_bindgen_test]
    fn test_submit_flushes_widget_values_in_visible_order() {
        let (document, editor) = install_fixture(&["A", "B"]);
        select_block(&document, 1);
        editor.on_add().expect("add should succeed");
        widget_textareas(&document)[2].set_value("D");

        submit(&document);
        assert_eq!(hidden_values(&document), vec!["A", "B", "D"]);
    }
}
