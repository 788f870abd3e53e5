/// Does an owned role set satisfy a required role set.
///
/// An empty requirement always passes; otherwise at least one required role
/// must be owned.
pub fn test_roles(required: &[String], owned: &[String]) -> bool {
    required.is_empty() || required.iter().any(|role| owned.contains(role))
}

/// Same check against the `requiresRoles: false | list` shape
pub fn satisfies(required: Option<&[String]>, owned: &[String]) -> bool {
    match required {
        Some(required) => test_roles(required, owned),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(list: &[&str]) -> Vec<String> {
        list.iter().map(|r| r.to_string()).collect()
    }

    #[test]
    fn empty_requirement_always_passes() {
        assert!(test_roles(&[], &roles(&["anything"])));
        assert!(test_roles(&[], &[]));
        assert!(satisfies(None, &[]));
    }

    #[test]
    fn disjoint_sets_fail() {
        assert!(!test_roles(&roles(&["r1"]), &roles(&["r2"])));
    }

    #[test]
    fn any_overlap_passes() {
        assert!(test_roles(&roles(&["r1", "r2"]), &roles(&["r2"])));
    }

    #[test]
    fn required_roles_with_no_owned_roles_fail() {
        assert!(!satisfies(Some(&roles(&["admin"])), &[]));
    }
}
