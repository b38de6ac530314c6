//! Tests for loading the question table.

use std::path::PathBuf;

use frameqa::work::{IdRange, LoadOptions, WorkItem, load_work_items, read_work_items};

fn load(csv: &str, opts: &LoadOptions) -> Vec<WorkItem> {
    read_work_items(csv.as_bytes(), opts).unwrap()
}

#[test]
fn ids_are_zero_padded_and_order_kept() {
    let csv = "id,question\n2,Which lane?\n1,How many cars?\n00010,Is the light red?\n";
    let items = load(csv, &LoadOptions::default());
    let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, ["00002", "00001", "00010"]);
    assert_eq!(items[0].question, "Which lane?");
}

#[test]
fn extra_columns_and_padded_headers_are_accepted() {
    let csv = " id , question ,video\n7,\"Turn left, or right?\",clip7.mp4\n";
    let items = load(csv, &LoadOptions::default());
    assert_eq!(items, [WorkItem::new("00007", "Turn left, or right?")]);
}

#[test]
fn multiline_questions_survive() {
    let csv = "id,question\n3,\"Which is true?\nA. stop\nB. go\"\n";
    let items = load(csv, &LoadOptions::default());
    assert_eq!(items[0].question, "Which is true?\nA. stop\nB. go");
}

#[test]
fn range_filter_keeps_only_matching_ids() {
    let csv = "id,question\n50,a\n51,b\n251,c\n252,d\nclip,e\n";
    let opts = LoadOptions {
        id_range: Some("51-251".parse().unwrap()),
        ..LoadOptions::default()
    };
    let items = load(csv, &opts);
    let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, ["00051", "00251"]);
}

#[test]
fn custom_id_width() {
    let csv = "id,question\n4,q\n";
    let opts = LoadOptions {
        id_width: 3,
        id_range: None,
    };
    assert_eq!(load(csv, &opts)[0].id, "004");
}

#[test]
fn duplicate_ids_are_kept() {
    let csv = "id,question\n1,first\n1,second\n";
    let items = load(csv, &LoadOptions::default());
    assert_eq!(items.len(), 2);
}

#[test]
fn missing_question_column_is_an_error() {
    let csv = "id,prompt\n1,hello\n";
    let err = read_work_items(csv.as_bytes(), &LoadOptions::default()).unwrap_err();
    assert_eq!(err.reason(), "csv");
}

#[test]
fn header_only_table_is_empty() {
    assert!(load("id,question\n", &LoadOptions::default()).is_empty());
}

#[test]
fn missing_file_is_io_error() {
    let path = PathBuf::from("/nonexistent/frameqa/questions.csv");
    let err = load_work_items(&path, &LoadOptions::default()).unwrap_err();
    assert_eq!(err.reason(), "io");
}

#[test]
fn id_range_round_trips_through_display() {
    let range: IdRange = " 1 - 50 ".parse().unwrap();
    assert_eq!(range.to_string(), "1-50");
    assert!(range.contains(1) && range.contains(50) && !range.contains(51));
    assert_eq!(range.iter().count(), 50);
}
