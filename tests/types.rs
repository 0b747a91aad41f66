// ABOUTME: Integration tests for image references and environment names.
// ABOUTME: Tests parsing, validation, and the mutable-alias distinction.

use promoter::types::*;
use proptest::prelude::*;

mod image_ref_tests {
    use super::*;

    #[test]
    fn parse_registry_repository_and_tag() {
        let img = ImageRef::parse("registry.example.com/shop:abc123").unwrap();
        assert_eq!(img.registry(), "registry.example.com");
        assert_eq!(img.repository(), "shop");
        assert_eq!(img.tag(), "abc123");
    }

    #[test]
    fn parse_nested_repository() {
        let img = ImageRef::parse("ghcr.io/org/team/shop:v1.2.3").unwrap();
        assert_eq!(img.registry(), "ghcr.io");
        assert_eq!(img.repository(), "org/team/shop");
        assert_eq!(img.tag(), "v1.2.3");
    }

    #[test]
    fn parse_keeps_registry_port() {
        let img = ImageRef::parse("localhost:5000/shop:abc123").unwrap();
        assert_eq!(img.registry(), "localhost:5000");
        assert_eq!(img.repository(), "shop");
        assert_eq!(img.tag(), "abc123");
    }

    #[test]
    fn display_matches_input() {
        let input = "registry.example.com:5000/team/shop:abc123";
        assert_eq!(ImageRef::parse(input).unwrap().to_string(), input);
    }

    #[test]
    fn parse_empty_returns_error() {
        assert_eq!(ImageRef::parse("  "), Err(ParseImageRefError::Empty));
    }

    #[test]
    fn parse_without_registry_returns_error() {
        assert!(matches!(
            ImageRef::parse("shop:abc123"),
            Err(ParseImageRefError::MissingRegistry(_))
        ));
    }

    #[test]
    fn parse_without_tag_returns_error() {
        assert!(matches!(
            ImageRef::parse("registry.example.com/shop"),
            Err(ParseImageRefError::MissingTag(_))
        ));
        assert!(matches!(
            ImageRef::parse("localhost:5000/shop"),
            Err(ParseImageRefError::MissingTag(_))
        ));
    }

    #[test]
    fn parse_rejects_invalid_characters() {
        assert_eq!(
            ImageRef::parse("registry.example.com/shop:a b"),
            Err(ParseImageRefError::InvalidChar(' '))
        );
    }

    #[test]
    fn latest_is_the_mutable_alias() {
        assert!(ImageRef::parse("registry.example.com/shop:latest").unwrap().is_mutable_alias());
        assert!(!ImageRef::parse("registry.example.com/shop:abc123").unwrap().is_mutable_alias());
    }

    #[test]
    fn with_tag_keeps_repository() {
        let base = ImageRef::parse("registry.example.com/shop:latest").unwrap();
        let tagged = base.with_tag("def456").unwrap();
        assert_eq!(tagged.to_string(), "registry.example.com/shop:def456");
        assert!(base.with_tag("").is_err());
    }

    #[test]
    fn separators_rejected_where_rendering_would_misplace_them() {
        let base = ImageRef::parse("registry.example.com/shop:latest").unwrap();
        assert_eq!(base.with_tag("v1:rc"), Err(ParseImageRefError::InvalidChar(':')));
        assert_eq!(base.with_tag("v1/rc"), Err(ParseImageRefError::InvalidChar('/')));
        assert_eq!(
            ImageRef::new("registry.example.com/team", "shop", "v1"),
            Err(ParseImageRefError::InvalidChar('/'))
        );
        assert!(ImageRef::new("localhost:5000", "team/shop", "v1").is_ok());
    }

    proptest! {
        #[test]
        fn accepted_references_render_and_parse_back(
            registry in "[a-z0-9.:_/-]{1,12}",
            repository in "[a-z0-9.:_/-]{1,16}",
            tag in "[A-Za-z0-9.:_/-]{1,10}",
        ) {
            if let Ok(img) = ImageRef::new(registry, repository, tag) {
                prop_assert_eq!(ImageRef::parse(&img.to_string()), Ok(img));
            }
        }
    }

    #[test]
    fn same_build_is_exact_and_case_sensitive() {
        let a = ImageRef::parse("registry.example.com/shop:abc123").unwrap();
        let b = ImageRef::parse("registry.example.com/shop:abc123").unwrap();
        let upper = ImageRef::parse("registry.example.com/shop:ABC123").unwrap();
        assert!(a.is_same_build(&b));
        assert!(!a.is_same_build(&upper));
    }

    #[test]
    fn serde_uses_canonical_string() {
        let img = ImageRef::parse("registry.example.com/shop:abc123").unwrap();
        let json = serde_json::to_string(&img).unwrap();
        assert_eq!(json, "\"registry.example.com/shop:abc123\"");
        let back: ImageRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, img);
    }
}

mod environment_name_tests {
    use super::*;

    #[test]
    fn well_known_names() {
        assert_eq!(EnvironmentName::staging().as_str(), "staging");
        assert_eq!(EnvironmentName::production().as_str(), "production");
        assert_eq!(
            EnvironmentName::new("production").unwrap(),
            EnvironmentName::production()
        );
    }

    #[test]
    fn empty_name_rejected() {
        assert_eq!(EnvironmentName::new(""), Err(EnvironmentNameError::Empty));
    }

    #[test]
    fn long_name_rejected() {
        let name = "a".repeat(64);
        assert_eq!(EnvironmentName::new(&name), Err(EnvironmentNameError::TooLong));
        assert!(EnvironmentName::new(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn edge_hyphens_rejected() {
        assert_eq!(EnvironmentName::new("-prod"), Err(EnvironmentNameError::EdgeHyphen));
        assert_eq!(EnvironmentName::new("prod-"), Err(EnvironmentNameError::EdgeHyphen));
        assert!(EnvironmentName::new("prod-eu").is_ok());
    }

    #[test]
    fn uppercase_rejected() {
        assert_eq!(
            EnvironmentName::new("Production"),
            Err(EnvironmentNameError::NotLowercase)
        );
    }

    #[test]
    fn invalid_characters_rejected() {
        assert_eq!(
            EnvironmentName::new("prod_eu"),
            Err(EnvironmentNameError::InvalidChar('_'))
        );
    }

    #[test]
    fn deserialize_validates() {
        let ok: EnvironmentName = serde_json::from_str("\"staging\"").unwrap();
        assert_eq!(ok, EnvironmentName::staging());
        assert!(serde_json::from_str::<EnvironmentName>("\"Staging\"").is_err());
    }
}
