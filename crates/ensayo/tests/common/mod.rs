//! Virtual GreenKart storefront shared by the integration tests.
//!
//! Behaviour mirrors the live practice shop closely enough for the scenario:
//! products arrive shortly after load, the search box filters cards by name,
//! steppers change the quantity field, the cart preview opens on the cart icon
//! and its remove links are covered by the opening animation for a moment,
//! and removals settle after a short delay.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use ensayo::{el, Document, EngineConfig, NodeId, Page, PageSetup, VirtualPage};

pub const GREENKART_URL: &str = "https://rahulshettyacademy.com/seleniumPractise/#/";

/// Products arrive this long after navigation
pub const PRODUCTS_DELAY: Duration = Duration::from_millis(400);
/// Remove links are covered for this long after the cart opens
pub const CART_ANIMATION: Duration = Duration::from_millis(500);
/// A removed cart line disappears after this long
pub const REMOVE_DELAY: Duration = Duration::from_millis(300);

pub const PRODUCTS: &[(&str, u32)] = &[
    ("Brocolli - 1 Kg", 120),
    ("Cauliflower - 1 Kg", 60),
    ("Cucumber - 1 Kg", 48),
    ("Beetroot - 1 Kg", 32),
    ("Carrot - 1 Kg", 56),
    ("Tomato - 1 Kg", 16),
    ("Beans - 1 Kg", 82),
    ("Mushroom - 1 Kg", 75),
    ("Potato - 1 Kg", 22),
    ("Corn - 1 Kg", 75),
];

/// Page over a fresh storefront, `base_url` pointing at the shop
pub fn page() -> Page<VirtualPage> {
    Page::new(greenkart(), config())
}

pub fn config() -> EngineConfig {
    EngineConfig::default()
        .with_base_url(GREENKART_URL)
        .with_timeout(5_000)
        .with_action_timeout(2_000)
}

/// The storefront as a virtual page
pub fn greenkart() -> VirtualPage {
    VirtualPage::from_fn(|_url: &str, page: &mut PageSetup<'_>| {
        load(page);
        Ok(())
    })
}

fn text_of(doc: &Document, node: NodeId, class: &str) -> Option<NodeId> {
    doc.descendants(node)
        .into_iter()
        .find(|n| doc.element(*n).is_some_and(|e| e.has_class(class)))
}

fn load(page: &mut PageSetup<'_>) {
    let doc = page.doc_mut();
    let body = doc.body();

    let header = doc.append(body, el("header").class("header"));
    doc.append(
        header,
        el("div")
            .class("brand")
            .child(el("span").class("greenLogo").text("GREEN"))
            .child(el("span").class("redLogo").text("KART")),
    );
    let search = doc.append(
        header,
        el("input")
            .class("search-keyword")
            .attr("type", "search")
            .attr("placeholder", "Search for Vegetables and Fruits")
            .value(""),
    );
    let cart_icon = doc.append(
        header,
        el("a")
            .class("cart-icon")
            .attr("href", "#")
            .child(el("img").attr("alt", "Cart").size(40.0, 40.0))
            .child(el("span").class("cart-count").text("0")),
    );
    let preview = doc.append(
        header,
        el("div")
            .class("cart-preview")
            .hidden()
            .child(el("div").class("cart-items").child(el("ul").class("cart-items-list")))
            .child(
                el("div")
                    .class("action-block")
                    .child(el("button").class("checkout").text("PROCEED TO CHECKOUT")),
            ),
    );
    let cart_list = text_of(doc, preview, "cart-items-list").expect("cart list");
    let cart_count = text_of(doc, cart_icon, "cart-count").expect("cart count");

    let list = doc.append(body, el("div").class("products"));
    let mut cards = Vec::new();
    for (name, price) in PRODUCTS {
        let card = doc.append(
            list,
            el("div")
                .class("product")
                .child(el("div").class("product-image").child(el("img").attr("alt", name)))
                .child(el("h4").class("product-name").text(name))
                .child(el("p").class("product-price").text(&price.to_string()))
                .child(
                    el("div")
                        .class("stepper-input")
                        .child(el("a").class("decrement").attr("href", "#").text("–"))
                        .child(
                            el("input")
                                .class("quantity")
                                .attr("type", "number")
                                .value("1"),
                        )
                        .child(el("a").class("increment").attr("href", "#").text("+")),
                )
                .child(
                    el("div")
                        .class("product-action")
                        .child(el("button").attr("type", "button").text("ADD TO CART")),
                ),
        );
        doc.remove(card);
        cards.push((card, name.to_lowercase()));
    }

    let arriving: Vec<NodeId> = cards.iter().map(|(c, _)| *c).collect();
    page.after(PRODUCTS_DELAY, move |doc| {
        for card in arriving {
            doc.attach(list, card);
        }
    });

    for (card, _) in &cards {
        let card = *card;
        let doc = page.doc_mut();
        let input = text_of(doc, card, "quantity").expect("quantity");
        let inc = text_of(doc, card, "increment").expect("increment");
        let dec = text_of(doc, card, "decrement").expect("decrement");
        let action = text_of(doc, card, "product-action").expect("product action");

        page.on_click(inc, move |ctx| {
            let doc = ctx.doc_mut();
            let qty: u32 = doc.value(input).and_then(|v| v.parse().ok()).unwrap_or(0);
            doc.set_value(input, &(qty + 1).to_string());
        });
        page.on_click(dec, move |ctx| {
            let doc = ctx.doc_mut();
            let qty: u32 = doc.value(input).and_then(|v| v.parse().ok()).unwrap_or(1);
            doc.set_value(input, &qty.saturating_sub(1).max(1).to_string());
        });
        page.on_click(action, move |ctx| {
            let doc = ctx.doc_mut();
            let name_node = text_of(doc, card, "product-name").expect("name");
            let name = doc.text_content(name_node);
            let qty = doc.value(input).unwrap_or("1").to_string();
            add_to_cart(doc, cart_list, &name, &qty);
            let count = doc.element_children(cart_list).count();
            doc.set_text(cart_count, &count.to_string());
        });
    }

    page.on_input(search, move |ctx| {
        let doc = ctx.doc_mut();
        let term = doc.value(search).unwrap_or("").to_lowercase();
        for (card, _) in &cards {
            doc.remove(*card);
        }
        for (card, name) in &cards {
            if name.contains(&term) {
                doc.attach(list, *card);
            }
        }
    });

    page.on_click(cart_icon, move |ctx| {
        let opening = {
            let doc = ctx.doc_mut();
            let open = doc.element(preview).is_some_and(|e| e.has_class("active"));
            if open {
                doc.remove_class(preview, "active");
                doc.set_displayed(preview, false);
            } else {
                doc.add_class(preview, "active");
                doc.set_displayed(preview, true);
            }
            !open
        };
        if !opening {
            return;
        }
        let links = remove_links(ctx.doc(), cart_list);
        set_obscured(ctx.doc_mut(), &links, true);
        ctx.after(CART_ANIMATION, move |doc| set_obscured(doc, &links, false));
    });

    page.on_click(cart_list, move |ctx| {
        let target = ctx.target();
        let doc = ctx.doc();
        if !doc.element(target).is_some_and(|e| e.has_class("product-remove")) {
            return;
        }
        let Some(line) = doc
            .ancestors(target)
            .find(|n| doc.element(*n).is_some_and(|e| e.has_class("cart-item")))
        else {
            return;
        };
        ctx.after(REMOVE_DELAY, move |doc| {
            doc.remove(line);
            let count = doc.element_children(cart_list).count();
            doc.set_text(cart_count, &count.to_string());
        });
    });
}

fn add_to_cart(doc: &mut Document, cart_list: NodeId, name: &str, qty: &str) {
    let existing = doc
        .element_children(cart_list)
        .find(|li| doc.text_content(*li).contains(name));
    if let Some(line) = existing {
        if let Some(q) = text_of(doc, line, "quantity") {
            doc.set_text(q, &format!("{qty} Nos."));
        }
        return;
    }
    doc.append(
        cart_list,
        el("li")
            .class("cart-item")
            .child(el("p").class("product-name").text(name))
            .child(el("p").class("quantity").text(&format!("{qty} Nos.")))
            .child(el("a").class("product-remove").attr("href", "#").text("×")),
    );
}

fn remove_links(doc: &Document, cart_list: NodeId) -> Vec<NodeId> {
    doc.descendants(cart_list)
        .into_iter()
        .filter(|n| doc.element(*n).is_some_and(|e| e.has_class("product-remove")))
        .collect()
}

fn set_obscured(doc: &mut Document, links: &[NodeId], obscured: bool) {
    for link in links {
        if let Some(el) = doc.element_mut(*link) {
            el.obscured = obscured;
        }
    }
}
