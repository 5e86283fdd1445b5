//! Locator Operations Benchmarks
//!
//! Selector parsing and scoped resolution against a storefront-sized DOM.
//!
//! Run with: `cargo bench --bench locator_ops`

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ensayo::prelude::*;
use ensayo::Resolver;

const PRODUCTS: &[&str] = &[
    "Brocolli", "Cauliflower", "Cucumber", "Beetroot", "Carrot", "Tomato", "Beans", "Brinjal",
    "Capsicum", "Mushroom", "Potato", "Pumpkin", "Corn", "Onion", "Apple", "Banana", "Grapes",
    "Mango", "Musk Melon", "Orange", "Pears", "Pomegranate", "Raspberry", "Strawberry",
    "Water Melon", "Almonds", "Pista", "Nuts Mixture", "Cashews", "Walnuts",
];

fn storefront() -> Document {
    let mut doc = Document::new();
    let body = doc.body();
    let list = doc.append(body, el("div").class("products"));
    for name in PRODUCTS {
        doc.append(
            list,
            el("div")
                .class("product")
                .child(el("h4").class("product-name").text(&format!("{name} - 1 Kg")))
                .child(el("p").class("product-price").text("56"))
                .child(
                    el("div")
                        .class("stepper-input")
                        .child(el("a").class("decrement").text("–"))
                        .child(el("input").class("quantity").attr("type", "number").value("1"))
                        .child(el("a").class("increment").text("+")),
                )
                .child(
                    el("div")
                        .class("product-action")
                        .child(el("button").text("ADD TO CART")),
                ),
        );
    }
    doc
}

fn bench_selector_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("selector_parsing");

    let selectors = vec![
        ("class", ".search-keyword"),
        ("has_text", ".product:has-text(\"Carrot\")"),
        ("attribute", "img[alt=\"Cart\"]"),
        ("compound", ".cart-preview.active .cart-items"),
        ("child", ".product-action > button"),
        ("text_engine", "text=ADD TO CART"),
        ("chain", ".product:has-text(\"Mushroom\") >> .increment"),
    ];

    for (name, selector) in selectors {
        group.bench_with_input(BenchmarkId::from_parameter(name), &selector, |bench, sel| {
            bench.iter(|| {
                let parsed = Locator::new(black_box(sel));
                black_box(parsed)
            });
        });
    }

    group.finish();
}

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");
    let doc = storefront();

    let cases = vec![
        ("root_class", Locator::new(".product").unwrap()),
        (
            "scoped_input",
            Locator::new(".product:has-text(\"Carrot\")")
                .unwrap()
                .locator("input.quantity")
                .unwrap(),
        ),
        (
            "scoped_text",
            Locator::new(".product:has-text(\"Mushroom\")")
                .unwrap()
                .locator("text=ADD TO CART")
                .unwrap(),
        ),
    ];

    for (name, locator) in cases {
        group.bench_with_input(BenchmarkId::from_parameter(name), &locator, |bench, loc| {
            bench.iter(|| {
                let resolver = Resolver::new(black_box(&doc));
                black_box(resolver.all(loc))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_selector_parsing, bench_resolution);
criterion_main!(benches);
