use schemars::schema_for;
use serde_json::json;

use crate::events::Envelope;
use crate::ingest::feed::FeedItem;
use crate::model::assumptions::Assumptions;
use crate::model::search::SavedSearch;

/// JSON Schemas for the crate's external shapes: feed items, saved
/// searches, underwriting assumptions, and the event envelope.
pub fn get_schema_json() -> String {
    let schemas = json!({
        "feedItem": schema_for!(FeedItem),
        "savedSearch": schema_for!(SavedSearch),
        "assumptions": schema_for!(Assumptions),
        "eventEnvelope": schema_for!(Envelope),
    });
    serde_json::to_string_pretty(&schemas).expect("schemas serialize")
}

pub fn run() -> anyhow::Result<()> {
    println!("{}", get_schema_json());
    Ok(())
}
