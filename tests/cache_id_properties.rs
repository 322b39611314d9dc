use proptest::prelude::*;

use static_regen::cache::{compute_cache_id, normalize_path};

const BASE_URL: &str = "https://example.org";

fn site_path() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z0-9_-]{1,8}", 1..5).prop_map(|segments| {
        let mut path = String::new();
        for segment in segments {
            path.push('/');
            path.push_str(&segment);
        }
        path
    })
}

proptest! {
    #[test]
    fn distinct_normalized_paths_never_collide(left in site_path(), right in site_path()) {
        prop_assume!(normalize_path(&left) != normalize_path(&right));
        prop_assert_ne!(
            compute_cache_id(BASE_URL, &left),
            compute_cache_id(BASE_URL, &right)
        );
    }

    #[test]
    fn trailing_slashes_do_not_change_the_id(path in site_path(), slashes in 1usize..4) {
        let padded = format!("{path}{}", "/".repeat(slashes));
        prop_assert_eq!(
            compute_cache_id(BASE_URL, &padded),
            compute_cache_id(BASE_URL, &path)
        );
    }

    #[test]
    fn ids_are_case_insensitive(path in site_path()) {
        prop_assert_eq!(
            compute_cache_id(BASE_URL, &path.to_uppercase()),
            compute_cache_id(BASE_URL, &path)
        );
    }
}

#[test]
fn root_is_its_own_id() {
    assert_eq!(
        compute_cache_id(BASE_URL, "/").as_str(),
        "https://example.org:/"
    );
    assert_eq!(compute_cache_id(BASE_URL, "//"), compute_cache_id(BASE_URL, "/"));
}
