mod common;

use assert2::check;
use cohort_search::query::ATTACHMENT_CONTENT_FIELD;
use cohort_search::{QueryRouter, SearchRequest, Settings, WeightingEngine};
use common::{attachment_settings, full_settings, term_query};
use rstest::rstest;
use serde_json::{Value, json};

fn listing(term: &str) -> SearchRequest {
    SearchRequest {
        term: Some(term.to_string()),
        teaser_query: true,
        ..SearchRequest::default()
    }
}

fn site_search(term: &str) -> SearchRequest {
    SearchRequest {
        term: Some(term.to_string()),
        teaser_search: true,
        ..SearchRequest::default()
    }
}

/// Test: search fields pick up extracted attachment text only when attachments are on.
#[rstest]
fn search_fields_follow_attachment_switch(full_settings: Settings, attachment_settings: Settings) {
    let base = vec!["post_title".to_string(), "post_content".to_string()];
    check!(QueryRouter::new(&full_settings).search_fields(base.clone()) == base);

    let extended = QueryRouter::new(&attachment_settings).search_fields(base);
    check!(extended.last().map(String::as_str) == Some(ATTACHMENT_CONTENT_FIELD));
}

/// Test: attachment listings rank by relevance, keep the old sort second and drop fuzziness.
#[rstest]
fn attachment_listing_weighting(attachment_settings: Settings) {
    let mut query = term_query("budget");
    query.should_multi_match_mut(0).unwrap().fields.push(ATTACHMENT_CONTENT_FIELD.to_string());

    let body = Value::from(WeightingEngine::new(&attachment_settings).weight(query, &listing("budget")));
    let inner = &body["query"]["function_score"]["query"]["bool"]["should"];

    check!(inner[0]["multi_match"]["fields"][0] == "post_title^3");
    check!(inner[0]["multi_match"]["fields"][3] == "attachments.attachment.content^0.75");
    check!(inner[1]["multi_match"]["fuzziness"] == 0);
    check!(
        body["sort"]
            == json!([
                { "_score": { "order": "desc" } },
                { "post_date": { "order": "desc" } },
            ])
    );
    check!(body["highlight"]["fields"]["post_content"] == json!({ "type": "plain" }));
    check!(body["_source"]["excludes"] == json!(["attachments*data", "attachments*content"]));
}

/// Test: listings get only the menu-order decay; site searches get the full table.
#[rstest]
fn function_count_by_surface(full_settings: Settings) {
    let engine = WeightingEngine::new(&full_settings);

    let listing_body = Value::from(engine.weight(term_query("pool"), &listing("pool")));
    let functions = listing_body["query"]["function_score"]["functions"].as_array().unwrap();
    check!(functions.len() == 1);
    check!(functions[0]["linear"]["menu_order"]["decay"] == 0.8);
    check!(listing_body["sort"][0]["post_date"].is_object());

    let search_body = Value::from(engine.weight(term_query("pool"), &site_search("pool")));
    let functions = search_body["query"]["function_score"]["functions"].as_array().unwrap();
    check!(functions.len() == 9);
    check!(functions[8]["gauss"]["meta._event_start_local.date"]["scale"] == "10d");
}

/// Test: without a term only the index boost and sort hints change.
#[rstest]
fn termless_listing_is_not_rewrapped(full_settings: Settings) {
    let mut query = term_query("");
    query.sort = vec![cohort_search::query::SortEntry::new("meta._event_start_local.datetime", "asc")];

    let body = Value::from(WeightingEngine::new(&full_settings).weight(query, &SearchRequest::default()));
    check!(body["query"].get("function_score").is_none());
    check!(body["query"]["bool"]["should"][0]["multi_match"]["fields"][0] == "post_title");
    check!(body["sort"][0]["meta._event_start_local.datetime"]["unmapped_type"] == "datetime");
    check!(body["indices_boost"] == json!([{ "maintenant": 1.1 }]));
    check!(body["post_filter"] == json!({ "match_all": {} }));
}

/// Test: date decay left to the backend means no envelope, even for site searches.
#[rstest]
fn decay_by_date_skips_envelope(full_settings: Settings) {
    let settings = Settings {
        decay_by_date: true,
        ..full_settings
    };
    let weighted = WeightingEngine::new(&settings).weight(term_query("pool"), &site_search("pool"));
    check!(weighted.function_score().is_none());
    check!(weighted.should_multi_match(0).unwrap().fields[0] == "post_title^3");
}
