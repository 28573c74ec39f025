//! Page lock overlay, DOM side

use std::cell::RefCell;

use ng_core::overlay::{
    BannerSpec, CheckLink, PageInput, PageLock, TrapDecision, TrapKind, TrapPolicy, BANNER_ID, BANNER_IMAGE_ALT,
    BANNER_IMAGE_STYLE, BANNER_STYLE, BANNER_TEXT_ID, CHECK_LINK_ID,
};
use ng_core::PageCommand;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{Document, Element, Event, KeyboardEvent, Window};

thread_local! {
    static PAGE_LOCK: RefCell<PageLock> = RefCell::new(PageLock::new());
}

/// Apply a page command to the current document. Returns `true` if the
/// page became locked by this call.
///
/// Traps go in first since they only need the document. If the banner
/// cannot be inserted yet (no `body`), the error is returned with the traps
/// already active, and a later command retries the banner alone.
pub fn apply(command: &PageCommand, image_src: &str) -> Result<bool, JsValue> {
    let Some(plan) = PAGE_LOCK.with(|lock| lock.borrow().plan(command, image_src)) else {
        return Ok(false);
    };

    let document = window()?
        .document()
        .ok_or_else(|| JsValue::from_str("No document"))?;

    if plan.install_traps {
        install_traps(&document)?;
        PAGE_LOCK.with(|lock| lock.borrow_mut().mark_traps_installed());
    }

    if let Some(banner) = plan.banner {
        install_banner(&document, &banner)?;
        PAGE_LOCK.with(|lock| lock.borrow_mut().mark_banner_installed());
    }

    Ok(is_locked())
}

pub fn is_locked() -> bool {
    PAGE_LOCK.with(|lock| lock.borrow().is_locked())
}

/// Whether input is already being trapped, banner or not.
pub fn is_trapping() -> bool {
    PAGE_LOCK.with(|lock| lock.borrow().traps_installed())
}

fn window() -> Result<Window, JsValue> {
    web_sys::window().ok_or_else(|| JsValue::from_str("No window"))
}

fn install_banner(document: &Document, banner: &BannerSpec) -> Result<(), JsValue> {
    let body = document
        .body()
        .ok_or_else(|| JsValue::from_str("Document has no body"))?;

    let container = document.create_element("div")?;
    container.set_id(BANNER_ID);
    container.set_attribute("style", BANNER_STYLE)?;

    let image = document.create_element("img")?;
    image.set_attribute("src", &banner.image_src)?;
    image.set_attribute("alt", BANNER_IMAGE_ALT)?;
    image.set_attribute("style", BANNER_IMAGE_STYLE)?;

    let text = document.create_element("span")?;
    text.set_id(BANNER_TEXT_ID);
    text.set_inner_html(&banner.message_html);

    container.append_child(&image)?;
    container.append_child(&text)?;

    if let Some(link) = &banner.check_link {
        let anchor = check_link(document, link)?;
        container.append_child(&anchor)?;
    }

    body.prepend_with_node_1(&container)?;
    Ok(())
}

fn check_link(document: &Document, link: &CheckLink) -> Result<Element, JsValue> {
    let anchor = document.create_element("a")?;
    anchor.set_id(CHECK_LINK_ID);
    anchor.set_attribute("href", "#")?;
    anchor.set_text_content(Some(&link.label));

    let lookup_url = link.lookup_url.clone();
    let on_click = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
        event.prevent_default();
        let lookup_url = lookup_url.clone();
        spawn_local(async move {
            if let Err(e) = request_check(&lookup_url).await {
                log::warn!("In-depth check request failed: {:?}", e);
            }
            if let Err(e) = window().and_then(|w| w.location().reload()) {
                log::warn!("Reload failed: {:?}", e);
            }
        });
    });
    anchor.add_event_listener_with_callback("click", on_click.as_ref().unchecked_ref())?;
    // Lives as long as the document
    on_click.forget();

    Ok(anchor)
}

async fn request_check(lookup_url: &str) -> Result<(), JsValue> {
    let promise = window()?.fetch_with_str(lookup_url);
    JsFuture::from(promise).await?;
    Ok(())
}

fn install_traps(document: &Document) -> Result<(), JsValue> {
    for kind in TrapKind::ALL {
        let listener = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            let decision = TrapPolicy.decide(page_input(kind, &event).as_input());
            if decision == TrapDecision::Block {
                event.prevent_default();
                event.stop_propagation();
            }
        });
        document.add_event_listener_with_callback_and_bool(
            kind.event_name(),
            listener.as_ref().unchecked_ref(),
            true,
        )?;
        listener.forget();
    }
    Ok(())
}

/// Owned view of an event, borrowed as a [`PageInput`].
struct ObservedInput {
    kind: TrapKind,
    key: String,
    inside_banner: bool,
}

impl ObservedInput {
    fn as_input(&self) -> PageInput<'_> {
        match self.kind {
            TrapKind::Click => PageInput::Click {
                inside_banner: self.inside_banner,
            },
            TrapKind::KeyDown => PageInput::KeyDown {
                key: &self.key,
                inside_banner: self.inside_banner,
            },
            TrapKind::ContextMenu => PageInput::ContextMenu,
        }
    }
}

fn page_input(kind: TrapKind, event: &Event) -> ObservedInput {
    let key = event
        .dyn_ref::<KeyboardEvent>()
        .map(KeyboardEvent::key)
        .unwrap_or_default();
    ObservedInput {
        kind,
        key,
        inside_banner: inside_banner(event),
    }
}

fn inside_banner(event: &Event) -> bool {
    let selector = format!("#{}", BANNER_ID);
    event
        .target()
        .and_then(|target| target.dyn_into::<Element>().ok())
        .and_then(|element| element.closest(&selector).ok().flatten())
        .is_some()
}
