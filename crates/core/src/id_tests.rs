// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

crate::define_id! {
    pub struct TestId("tst-");
}

#[test]
fn new_ids_carry_prefix() {
    let id = TestId::new();
    assert!(id.as_str().starts_with("tst-"));
    assert_eq!(id.as_str().len(), ID_MAX_LEN);
}

#[test]
fn new_ids_are_unique() {
    let a = TestId::new();
    let b = TestId::new();
    assert_ne!(a.as_str(), b.as_str());
}

#[test]
fn from_string_round_trips() {
    let id = TestId::from_string("tst-abc");
    assert_eq!(id.as_str(), "tst-abc");
    assert_eq!(id.suffix(), "abc");
}

#[test]
fn short_truncates_suffix() {
    let id = TestId::from_string("tst-abcdef");
    assert_eq!(id.short(3), "abc");
    assert_eq!(id.short(100), "abcdef");
}

#[test]
fn equality_and_hash_match_across_construction_paths() {
    use std::collections::HashSet;
    let a = TestId::from_string("tst-same");
    let b: TestId = "tst-same".into();
    assert_eq!(a, b);

    let mut set = HashSet::new();
    set.insert(a);
    assert!(set.contains(&b));
}
