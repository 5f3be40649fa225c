// demos/basic_usage.rs
//! Running a script against a webhook-style payload
//!
//! Run with: cargo run --example basic_usage

use hookscript::{HostValue, Session};

fn main() {
    // Guest print() output and bridge warnings go through tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let payload: serde_json::Value = serde_json::from_str(
        r#"{
            "action": "opened",
            "issue": { "number": 101, "title": "panic on empty config" },
            "labels": ["bug", "needs-triage"]
        }"#,
    )
    .unwrap();

    let mut session = Session::new();
    session
        .set("event", HostValue::from_json(&payload))
        .set_fn("comment", |args| {
            if let Some(HostValue::Text(body)) = args.first() {
                println!("commenting: {}", body);
                HostValue::Bool(true)
            } else {
                HostValue::Absent
            }
        });

    let script = r#"
        if event.action == 'opened' then
            local issue = event.issue
            comment('Thanks for reporting issue #' .. issue.number .. '!')
            return { handled = true, number = issue.number }
        end
        return { handled = false }
    "#;

    match session.run(script) {
        Ok(result) => println!("script returned: {:?}", result),
        Err(err) => eprintln!("script failed: {}", err),
    }
}
