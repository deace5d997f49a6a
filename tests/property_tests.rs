/// Property-based tests using proptest
/// Invariants of filter compilation and cache key derivation
use lead_search_core::cache::keys::{preview_key, search_key, PREVIEW_PREFIX, SEARCH_PREFIX};
use lead_search_core::filters::{canonicalize, compile_filters, MAX_LIMIT};
use lead_search_core::models::SearchFilter;
use proptest::prelude::*;

fn opt_text() -> impl Strategy<Value = Option<String>> {
    proptest::option::of("[a-z]{1,8}( [a-z]{1,8})?")
}

fn search_filter() -> impl Strategy<Value = SearchFilter> {
    (
        (opt_text(), opt_text(), opt_text(), opt_text(), opt_text(), opt_text(), opt_text()),
        (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()),
        (
            proptest::option::of(-90.0f64..=90.0),
            proptest::option::of(-180.0f64..=180.0),
            proptest::option::of(0.5f64..500.0),
            proptest::option::of(prop_oneof![Just("km".to_string()), Just("miles".to_string())]),
        ),
        (
            proptest::option::of(prop_oneof![
                Just("newest".to_string()),
                Just("oldest".to_string()),
                Just("quality".to_string()),
                Just("name".to_string())
            ]),
            proptest::option::of(0u32..50),
            proptest::option::of(0u32..500),
        ),
    )
        .prop_map(
            |(
                (industry, sub_niche, cuisine, sport, tattoo_style, country, city),
                (has_email, has_phone, has_website, has_social_media, verified),
                (latitude, longitude, radius, unit),
                (sort, page, limit),
            )| SearchFilter {
                industry,
                sub_niche,
                cuisine,
                sport,
                tattoo_style,
                country,
                city,
                has_email,
                has_phone,
                has_website,
                has_social_media,
                verified,
                latitude,
                longitude,
                radius,
                unit,
                sort,
                page,
                limit,
            },
        )
}

fn pad(value: &Option<String>) -> Option<String> {
    value.as_ref().map(|v| format!("  {}\t", v))
}

// Property: identical filter sets always hash to the same key
proptest! {
    #[test]
    fn keys_are_deterministic(filter in search_filter()) {
        let copy = filter.clone();
        prop_assert_eq!(search_key(&canonicalize(&filter)), search_key(&canonicalize(&copy)));
        prop_assert_eq!(preview_key(&canonicalize(&filter)), preview_key(&canonicalize(&copy)));
    }

    #[test]
    fn keys_live_under_their_prefixes(filter in search_filter()) {
        let applied = canonicalize(&filter);
        prop_assert!(search_key(&applied).starts_with(SEARCH_PREFIX));
        prop_assert!(preview_key(&applied).starts_with(PREVIEW_PREFIX));
    }

    #[test]
    fn surrounding_whitespace_does_not_split_the_cache(filter in search_filter()) {
        let padded = SearchFilter {
            industry: pad(&filter.industry),
            cuisine: pad(&filter.cuisine),
            city: pad(&filter.city),
            ..filter.clone()
        };
        prop_assert_eq!(search_key(&canonicalize(&filter)), search_key(&canonicalize(&padded)));
    }

    #[test]
    fn incomplete_geo_triple_matches_no_geo(filter in search_filter()) {
        let no_geo = SearchFilter { latitude: None, longitude: None, radius: None, ..filter.clone() };
        let partial = SearchFilter { radius: None, ..filter.clone() };
        prop_assert_eq!(search_key(&canonicalize(&no_geo)), search_key(&canonicalize(&partial)));
    }

    #[test]
    fn distinct_equality_values_produce_distinct_keys(
        filter in search_filter(),
        a in "[a-z]{1,8}",
        b in "[a-z]{1,8}",
    ) {
        prop_assume!(a != b);
        let left = SearchFilter { city: Some(a), ..filter.clone() };
        let right = SearchFilter { city: Some(b), ..filter };
        prop_assert_ne!(search_key(&canonicalize(&left)), search_key(&canonicalize(&right)));
    }

    #[test]
    fn preview_key_ignores_sort_and_pagination(
        filter in search_filter(),
        page in 1u32..100,
        limit in 1u32..100,
    ) {
        let paged = SearchFilter {
            page: Some(page),
            limit: Some(limit),
            sort: Some("name".to_string()),
            ..filter.clone()
        };
        prop_assert_eq!(preview_key(&canonicalize(&filter)), preview_key(&canonicalize(&paged)));
    }
}

// Property: compiled pagination is always within bounds
proptest! {
    #[test]
    fn compiled_pagination_is_bounded(filter in search_filter()) {
        let compiled = compile_filters(&filter);
        prop_assert!(compiled.applied.page >= 1);
        prop_assert!(compiled.applied.limit >= 1);
        prop_assert!(compiled.applied.limit <= MAX_LIMIT);
        prop_assert_eq!(compiled.limit, i64::from(compiled.applied.limit));
        prop_assert_eq!(
            compiled.offset,
            i64::from(compiled.applied.page - 1) * i64::from(compiled.applied.limit)
        );
    }

    #[test]
    fn applied_radius_is_always_positive(filter in search_filter()) {
        if let Some(geo) = canonicalize(&filter).geo {
            prop_assert!(geo.radius > 0.0);
            prop_assert!((-90.0..=90.0).contains(&geo.latitude));
            prop_assert!((-180.0..=180.0).contains(&geo.longitude));
        }
    }

    #[test]
    fn compilation_never_panics(
        latitude in proptest::option::of(any::<f64>()),
        longitude in proptest::option::of(any::<f64>()),
        radius in proptest::option::of(any::<f64>()),
        unit in proptest::option::of("\\PC*"),
        sort in proptest::option::of("\\PC*"),
        page in proptest::option::of(any::<u32>()),
        limit in proptest::option::of(any::<u32>()),
    ) {
        let filter = SearchFilter { latitude, longitude, radius, unit, sort, page, limit, ..Default::default() };
        let compiled = compile_filters(&filter);
        let _ = search_key(&compiled.applied);
    }
}
