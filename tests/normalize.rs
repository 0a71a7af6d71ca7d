use assert_matches::assert_matches;

use relief_map_jobs::domain::{Coordinate, Envelope, InfoRecord};
use relief_map_jobs::error::JobError;
use relief_map_jobs::geocode::Locator;
use relief_map_jobs::normalize::{
    InfoNormalizer, geocode_address, normalize_road, normalize_store, normalize_support,
};
use relief_map_jobs::schema::{ColumnSchema, SchemaVersion};

#[derive(Default)]
struct RecordingLocator {
    addresses: Vec<String>,
}

impl Locator for RecordingLocator {
    fn locate(&mut self, address: &str) -> Option<Coordinate> {
        self.addresses.push(address.to_string());
        if address.contains("Unknown") {
            None
        } else {
            Some(Coordinate::new(37.0, 137.0))
        }
    }
}

fn tsv(rows: &[&[&str]]) -> String {
    rows.iter()
        .map(|row| row.join("\t"))
        .collect::<Vec<_>>()
        .join("\n")
}

const V1_HEADER: &[&str] = &[
    "id", "市町村", "市町村2", "市町村3", "状況", "最終更新時刻", "状態", "対応状況", "情報源",
];

fn normalize_v1(input: &str) -> Vec<InfoRecord> {
    InfoNormalizer::new(ColumnSchema::info(SchemaVersion::V1))
        .normalize(input.as_bytes())
        .unwrap()
}

#[test]
fn merged_cells_carry_forward_and_overflow_becomes_notes() {
    let input = tsv(&[
        V1_HEADER,
        &[
            "A1", "Town1", "", "Sub1", "OK", "2024-01-01", "安全", "対応済", "http://x", "note1",
            "note2",
        ],
        &[
            "", "", "", "Sub2", "OK", "2024-01-02", "安全", "対応済", "http://y", "", "",
        ],
    ]);
    let records = normalize_v1(&input);

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id.as_deref(), Some("A1"));
    assert_eq!(records[0].notes, "note1\nnote2");
    assert_eq!(records[1].id.as_deref(), Some("A1"));
    assert_eq!(records[1].municipality.as_deref(), Some("Town1"));
    assert_eq!(records[1].municipality2, None);
    assert_eq!(records[1].municipality3, "Sub2");
    assert_eq!(records[1].last_updated_at, "2024-01-02");
    assert_eq!(records[1].source_url, "http://y");
    assert_eq!(records[1].notes, "");
    assert_eq!(records[1].location, None);
}

#[test]
fn carry_forward_uses_nearest_non_blank_value_per_column() {
    let input = tsv(&[
        V1_HEADER,
        &["A1", "輪島市", "門前町", "黒島", "s", "t", "u", "v", "w"],
        &["", "", "", "道下", "s", "t", "u", "v", "w"],
        &["A2", "", "", "剱地", "s", "t", "u", "v", "w"],
        &["", "珠洲市", "", "宝立町", "s", "t", "u", "v", "w"],
        &["", "", "三崎町", "寺家", "s", "t", "u", "v", "w"],
    ]);
    let records = normalize_v1(&input);

    let identity = records
        .iter()
        .map(|record| {
            (
                record.id.as_deref(),
                record.municipality.as_deref(),
                record.municipality2.as_deref(),
            )
        })
        .collect::<Vec<_>>();
    assert_eq!(
        identity,
        vec![
            (Some("A1"), Some("輪島市"), Some("門前町")),
            (Some("A1"), Some("輪島市"), Some("門前町")),
            (Some("A2"), Some("輪島市"), Some("門前町")),
            (Some("A2"), Some("珠洲市"), Some("門前町")),
            (Some("A2"), Some("珠洲市"), Some("三崎町")),
        ]
    );
}

#[test]
fn leading_blank_rows_keep_null_identity() {
    let input = tsv(&[
        V1_HEADER,
        &["", "", "", "不明", "s", "t", "u", "v", "w"],
        &["B1", "七尾市", "", "能登島", "s", "t", "u", "v", "w"],
    ]);
    let records = normalize_v1(&input);

    assert_eq!(records[0].id, None);
    assert_eq!(records[0].municipality, None);
    assert_eq!(records[0].municipality2, None);
    assert_eq!(records[1].id.as_deref(), Some("B1"));
}

#[test]
fn notes_drop_empty_overflow_cells_in_order() {
    let input = tsv(&[
        V1_HEADER,
        &["A1", "x", "y", "z", "s", "t", "u", "v", "w", "", "first", "", "second", "third"],
    ]);
    let records = normalize_v1(&input);
    assert_eq!(records[0].notes, "first\nsecond\nthird");
}

#[test]
fn cells_are_trimmed() {
    let input = tsv(&[
        V1_HEADER,
        &[" A1 ", " 輪島市", "", "", "s", "t", "u", "v", "w", "  ", " memo "],
    ]);
    let records = normalize_v1(&input);
    assert_eq!(records[0].id.as_deref(), Some("A1"));
    assert_eq!(records[0].municipality.as_deref(), Some("輪島市"));
    assert_eq!(records[0].notes, "memo");
}

#[test]
fn v2_geocodes_each_row_with_prefecture_prefix() {
    let input = tsv(&[
        &["header"],
        &[
            "A1", "輪島市", "門前町", "黒島", "12", "yes", "孤立", "2024-01-05", "要支援", "1",
            "水", "未対応", "http://a",
        ],
        &[
            "", "", "", "", "", "", "孤立", "2024-01-05", "要支援", "", "", "未対応", "http://b",
            "extra",
        ],
        &[
            "A2", "Unknown", "", "", "", "", "", "", "", "", "", "", "",
        ],
    ]);
    let mut locator = RecordingLocator::default();
    let records = InfoNormalizer::new(ColumnSchema::info(SchemaVersion::V2))
        .with_locator(&mut locator)
        .normalize(input.as_bytes())
        .unwrap();

    assert_eq!(
        locator.addresses,
        vec![
            "石川県輪島市門前町黒島".to_string(),
            "石川県輪島市門前町".to_string(),
            "石川県Unknown門前町".to_string(),
        ]
    );
    assert_eq!(records[0].location, Some(Coordinate::new(37.0, 137.0)));
    assert_eq!(records[0].count.as_deref(), Some("12"));
    assert_eq!(records[0].city_aware.as_deref(), Some("yes"));
    assert_eq!(records[0].support_flag.as_deref(), Some("1"));
    assert_eq!(records[0].latest_need.as_deref(), Some("水"));
    assert_eq!(records[0].response_status, "未対応");
    assert_eq!(records[1].notes, "extra");
    assert_eq!(records[2].location, None);
}

#[test]
fn v1_leaves_location_for_the_dashboard() {
    let input = tsv(&[V1_HEADER, &["A1", "輪島市", "", "", "s", "t", "u", "v", "w"]]);
    let mut locator = RecordingLocator::default();
    let records = InfoNormalizer::new(ColumnSchema::info(SchemaVersion::V1))
        .with_locator(&mut locator)
        .normalize(input.as_bytes())
        .unwrap();

    assert!(locator.addresses.is_empty());
    assert_eq!(records[0].location, None);
    assert_eq!(records[0].count, None);
}

#[test]
fn custom_prefecture_prefixes_address() {
    let input = tsv(&[
        &["header"],
        &["A1", "氷見市", "", "", "", "", "", "", "", "", "", "", ""],
    ]);
    let mut locator = RecordingLocator::default();
    InfoNormalizer::new(ColumnSchema::info(SchemaVersion::V2))
        .with_prefecture("富山県")
        .with_locator(&mut locator)
        .normalize(input.as_bytes())
        .unwrap();
    assert_eq!(locator.addresses, vec!["富山県氷見市".to_string()]);
}

#[test]
fn address_is_skipped_without_municipality_parts() {
    let input = tsv(&[V1_HEADER, &["", "", "", "", "s", "t", "u", "v", "w"]]);
    let records = normalize_v1(&input);
    assert_eq!(geocode_address("石川県", &records[0]), None);
}

#[test]
fn short_row_fails_the_dataset() {
    let input = tsv(&[V1_HEADER, &["A1", "輪島市", "", ""]]);
    let result = InfoNormalizer::new(ColumnSchema::info(SchemaVersion::V1)).normalize(input.as_bytes());
    assert_matches!(
        result,
        Err(JobError::RowShape {
            expected: 9,
            found: 4,
            line: 2,
            ..
        })
    );
}

#[test]
fn stray_quote_does_not_swallow_following_rows() {
    let store = tsv(&[
        &["No", "地域", "店舗名"],
        &["1", "輪島", "\"本店", "営業中"],
        &["2", "珠洲", "珠洲店", "時短"],
        &["3", "七尾", "七尾店", ""],
    ]);
    let records = normalize_store(store.as_bytes()).unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(records[0].store_name, "\"本店");
    assert_eq!(records[0].notes, "営業中");
    assert_eq!(records[1].store_name, "珠洲店");
    assert_eq!(records[2].region, "七尾");
}

#[test]
fn quoted_cells_keep_their_quotes() {
    let support = tsv(&[
        &["タイトル", "情報源"],
        &["\"至急\" 水が必要", "http://s", "\"午後\""],
    ]);
    let records = normalize_support(support.as_bytes()).unwrap();

    assert_eq!(records[0].title, "\"至急\" 水が必要");
    assert_eq!(records[0].notes, "\"午後\"");
}

#[test]
fn road_rows_start_at_first_line_without_carry_forward() {
    let input = tsv(&[
        &["通行止め", "2024-01-03", "http://r1", "", "迂回路あり"],
        &["", "2024-01-04", "http://r2"],
    ]);
    let records = normalize_road(input.as_bytes()).unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].situation, "通行止め");
    assert_eq!(records[0].notes, "迂回路あり");
    assert_eq!(records[1].situation, "");
    assert_eq!(records[1].source_url, "http://r2");
}

#[test]
fn support_and_store_skip_one_header_line() {
    let support = tsv(&[
        &["タイトル", "情報源"],
        &["給水支援", "http://s", "午前のみ"],
    ]);
    let records = normalize_support(support.as_bytes()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].title, "給水支援");
    assert_eq!(records[0].notes, "午前のみ");

    let store = tsv(&[
        &["No", "地域", "店舗名"],
        &["1", "輪島", "コンビニ輪島店", "営業中", "", "時短"],
    ]);
    let records = normalize_store(store.as_bytes()).unwrap();
    assert_eq!(records[0].number, "1");
    assert_eq!(records[0].region, "輪島");
    assert_eq!(records[0].store_name, "コンビニ輪島店");
    assert_eq!(records[0].notes, "営業中\n時短");
}

#[test]
fn info_json_uses_camel_case_and_null_location() {
    let input = tsv(&[V1_HEADER, &["A1", "輪島市", "", "", "s", "t", "u", "v", "w"]]);
    let records = normalize_v1(&input);
    let body = Envelope::new(&records).to_json().unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();

    let first = &value["data"][0];
    assert_eq!(first["id"], "A1");
    assert_eq!(first["lastUpdatedAt"], "t");
    assert_eq!(first["responseStatus"], "v");
    assert_eq!(first["sourceUrl"], "w");
    assert!(first["location"].is_null());
    assert!(first["municipality2"].is_null());
    assert!(first.get("count").is_none());
}
