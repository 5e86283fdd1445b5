//! GreenKart Demo - scoped locators, waits, and the diagnostic overlay
//!
//! Drives a small in-memory storefront through the quantity and cart flow,
//! first with the `Page` API, then as a declarative scenario.
//!
//! # Running
//!
//! ```bash
//! cargo run --example greenkart_demo -p ensayo
//! ```

#![allow(clippy::uninlined_format_args, clippy::unwrap_used)]

use std::time::Duration;

use ensayo::prelude::*;
use ensayo::{NodeId, PageSetup, StepStatus};

const SHOP: &str = "https://shop.test/";

const SCENARIO: &str = r#"
name: demo-cart
url: ""
locators:
  - name: carrot
    selector: '.product:has-text("Carrot")'
  - name: carrot_qty
    selector: input.quantity
    within: carrot
  - name: carrot_increment
    selector: .increment
    within: carrot
  - name: carrot_add
    selector: text=ADD TO CART
    within: carrot
  - name: cart
    selector: .cart
steps:
  - type: goto
  - type: wait_for
    locator: carrot
    state: visible
  - type: increment
    locator: carrot_increment
    times: 2
  - type: read
    locator: carrot_qty
    into: qty
  - type: expect_var
    var: qty
    equals: "3"
  - type: click
    locator: carrot_add
  - type: expect
    locator: cart
    contains_text: "Carrot x3"
  - type: log
    message: "Carrot quantity ${qty} is in the cart"
"#;

#[tokio::main]
async fn main() -> EnsayoResult<()> {
    println!("=== Ensayo GreenKart Demo ===\n");

    demo_page_api().await?;
    demo_scenario().await?;

    println!("\n=== GreenKart Demo Complete ===");
    Ok(())
}

async fn demo_page_api() -> EnsayoResult<()> {
    println!("--- Demo 1: Page API ---\n");

    let config = EngineConfig::default().with_base_url(SHOP);
    let mut page = Page::new(storefront(), config);
    page.goto("").await?;
    page.log("Opened the shop").await;

    // Unscoped, every card's field matches
    let any_qty = page.locator("input.quantity")?;
    match page.fill(&any_qty, "5").await {
        Err(err) => println!("Unscoped fill: {err}"),
        Ok(_) => println!("Unscoped fill unexpectedly resolved"),
    }

    // Scoped to one card, resolution is unambiguous
    let carrot = page.locator(r#".product:has-text("Carrot")"#)?;
    let carrot_qty = carrot.locator("input.quantity")?;
    page.wait_for(&carrot, WaitCondition::Visible).await?;
    page.fill(&carrot_qty, "5").await?;
    println!("Carrot quantity: {}", page.input_value(&carrot_qty).await?);

    let tomato = page.locator(r#".product:has-text("Tomato")"#)?;
    let tomato_inc = tomato.locator(".increment")?;
    page.increment(&tomato_inc, 2, ActionOptions::default()).await?;
    page.expect(&tomato.locator("input.quantity")?)
        .to_have_value("3")
        .await?;
    page.log("Quantities set").await;

    println!("\nOverlay:");
    for entry in page.diagnostics().entries() {
        println!("  {}", entry.render());
    }
    page.close().await?;
    println!();
    Ok(())
}

async fn demo_scenario() -> EnsayoResult<()> {
    println!("--- Demo 2: Declarative Scenario ---\n");

    let scenario = Scenario::from_yaml(SCENARIO)?;
    let config = EngineConfig::default().with_base_url(SHOP);
    let mut page = Page::new(storefront(), config);
    let report = ScenarioRunner::new(&mut page).run(&scenario).await;

    for step in &report.steps {
        let mark = match step.status {
            StepStatus::Passed => "✓",
            StepStatus::Failed => "✗",
            StepStatus::Skipped => "-",
        };
        println!("{mark} {:>2}. {}", step.index, step.description);
    }
    println!(
        "\nScenario '{}' {} in {:?}",
        report.scenario,
        if report.passed { "passed" } else { "failed" },
        report.duration
    );
    Ok(())
}

/// Two products that arrive after load and a cart that lists additions
fn storefront() -> VirtualPage {
    VirtualPage::from_fn(|_url: &str, page: &mut PageSetup<'_>| {
        let doc = page.doc_mut();
        let body = doc.body();
        let cart = doc.append(body, el("ul").class("cart"));
        let list = doc.append(body, el("div").class("products"));

        let mut cards = Vec::new();
        for name in ["Carrot", "Tomato"] {
            let card = doc.append(
                list,
                el("div")
                    .class("product")
                    .child(el("h4").text(name))
                    .child(el("input").class("quantity").value("1"))
                    .child(el("a").class("increment").text("+"))
                    .child(el("button").text("ADD TO CART")),
            );
            doc.remove(card);
            cards.push((card, name));
        }

        let arriving: Vec<NodeId> = cards.iter().map(|(c, _)| *c).collect();
        page.after(Duration::from_millis(200), move |doc| {
            for card in arriving {
                doc.attach(list, card);
            }
        });

        for (card, name) in cards {
            let doc = page.doc_mut();
            let find = |tag: &str| {
                doc.descendants(card)
                    .into_iter()
                    .find(|n| doc.element(*n).is_some_and(|e| e.tag == tag))
            };
            let (Some(input), Some(inc), Some(button)) = (find("input"), find("a"), find("button"))
            else {
                continue;
            };
            page.on_click(inc, move |ctx| {
                let doc = ctx.doc_mut();
                let qty: u32 = doc.value(input).and_then(|v| v.parse().ok()).unwrap_or(0);
                doc.set_value(input, &(qty + 1).to_string());
            });
            page.on_click(button, move |ctx| {
                let doc = ctx.doc_mut();
                let qty = doc.value(input).unwrap_or("1").to_string();
                doc.append(cart, el("li").text(&format!("{name} x{qty}")));
            });
        }
        Ok(())
    })
}
