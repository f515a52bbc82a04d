use ma_collection::{
    BidiType, CollectionError, CollectionOptions, ConflictPolicy, MaMap,
};

#[test]
fn json_options_fill_missing_fields_with_defaults() {
    let opts: CollectionOptions = serde_json::from_str(r#"{ "bidi": "all_values" }"#).unwrap();
    assert_eq!(opts.bidi, BidiType::AllValues);
    assert_eq!(opts.conflict, ConflictPolicy::NewReferenceWins);
    assert_eq!(opts.verify_integrity, cfg!(debug_assertions));
}

#[test]
fn toml_options_drive_a_bidi_map() {
    let opts: CollectionOptions = toml::from_str(
        r#"
            bidi = "all_values"
            conflict = "reject_new"
            verify_integrity = true
        "#,
    )
    .unwrap();
    assert!(opts.is_bidi());

    let map = MaMap::hashed_with(opts);
    map.put("a", 1).unwrap();
    assert_eq!(map.put("b", 1), Err(CollectionError::Conflict));
    assert_eq!(map.inverse_lookup(&1), Some("a"));
}

#[test]
fn unknown_policy_names_are_rejected() {
    let parsed = serde_json::from_str::<CollectionOptions>(r#"{ "conflict": "first_wins" }"#);
    assert!(parsed.is_err());
}

#[test]
fn options_serialize_with_snake_case_names() {
    let json = serde_json::to_value(CollectionOptions::bidi()).unwrap();
    assert_eq!(json["bidi"], "all_values");
    assert_eq!(json["conflict"], "new_reference_wins");
}
