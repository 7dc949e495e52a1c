/// `<prefix>_<user>_<request_id>.json`, the name containers write their
/// response under.
pub fn response_file_name(prefix: &str, user: &str, request_id: &str) -> String {
    format!("{prefix}_{user}_{request_id}.json")
}

/// Whether `file_name` is the response file for `request_id`: either
/// `<request_id>.json` or anything ending in `_<request_id>.json`.
pub fn matches_request(file_name: &str, request_id: &str) -> bool {
    if request_id.is_empty() {
        return false;
    }
    let Some(stem) = file_name.strip_suffix(".json") else {
        return false;
    };
    stem == request_id
        || stem
            .strip_suffix(request_id)
            .is_some_and(|rest| rest.ends_with('_'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_file_name() {
        assert_eq!(
            response_file_name("notebook", "user1", "abc-123"),
            "notebook_user1_abc-123.json"
        );
    }

    #[test]
    fn test_matches_request() {
        assert!(matches_request("notebook_user1_abc-123.json", "abc-123"));
        assert!(matches_request("abc-123.json", "abc-123"));
        assert!(matches_request(
            &response_file_name("dataengine-service", "a_b", "abc-123"),
            "abc-123"
        ));

        assert!(!matches_request("notebook_user1_xabc-123.json", "abc-123"));
        assert!(!matches_request("notebook_user1_abc-123.json.tmp", "abc-123"));
        assert!(!matches_request("notebook_user1_abc-1234.json", "abc-123"));
        assert!(!matches_request("notebook_user1_abc-123.txt", "abc-123"));
        assert!(!matches_request("_.json", ""));
    }
}
