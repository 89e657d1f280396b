use crate::error::ApiError;
use crate::posts::dto::CreatePostRequest;
use crate::posts::repo::NewPost;

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_AUTHOR_NAME_CHARS: usize = 100;
pub const MAX_TAG_CHARS: usize = 50;
pub const MAX_TAGS: usize = 10;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 50;
pub const EXCERPT_CHARS: usize = 200;

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Validate and normalize a create request into a storable post.
pub fn sanitize_new_post(req: CreatePostRequest) -> Result<NewPost, ApiError> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("Title is required".into()));
    }
    let content = req.content.trim();
    if content.is_empty() {
        return Err(ApiError::BadRequest("Content is required".into()));
    }
    let author_id = req
        .author_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Author ID is required".into()))?
        .to_lowercase();

    let author_name = {
        let trimmed = truncate_chars(req.author_name.as_deref().unwrap_or("").trim(), MAX_AUTHOR_NAME_CHARS);
        if trimmed.is_empty() {
            "Anonymous".to_string()
        } else {
            trimmed
        }
    };

    let status = match req.status.as_deref() {
        Some(s @ ("draft" | "published")) => s.to_string(),
        _ => "published".to_string(),
    };

    // Non-string entries are dropped rather than rejected.
    let tags: Vec<String> = req
        .tags
        .iter()
        .filter_map(|v| v.as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| truncate_chars(&t.to_lowercase(), MAX_TAG_CHARS))
        .take(MAX_TAGS)
        .collect();

    let cover_image = match req.cover_image.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => {
            url::Url::parse(raw)
                .map_err(|_| ApiError::BadRequest("Invalid cover image URL".into()))?;
            Some(raw.to_string())
        }
    };

    Ok(NewPost {
        title: truncate_chars(title, MAX_TITLE_CHARS),
        content: content.to_string(),
        cover_image,
        tags,
        author_name,
        author_id,
        status,
    })
}

/// Ownership rule for post mutation. A stored author id is authoritative;
/// the display-name fallback only exists for records predating stable ids.
pub fn can_modify(
    post_author_id: &str,
    post_author_name: &str,
    caller_id: &str,
    caller_name: Option<&str>,
) -> bool {
    let post_id = post_author_id.trim().to_lowercase();
    let caller_id = caller_id.trim().to_lowercase();

    if !post_id.is_empty() {
        return !caller_id.is_empty() && post_id == caller_id;
    }

    match caller_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => post_author_name.trim().to_lowercase() == name.to_lowercase(),
        None => false,
    }
}

/// Escape LIKE wildcards in user-supplied search text, then wrap in `%`.
pub fn search_pattern(term: &str) -> String {
    let escaped: String = term
        .chars()
        .flat_map(|c| match c {
            '\\' | '%' | '_' => vec!['\\', c],
            _ => vec![c],
        })
        .collect();
    format!("%{escaped}%")
}

/// Limit 1–50, defaulting (also for non-positive values) to 10.
pub fn normalize_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(l) if l > 0 => l.min(MAX_LIMIT),
        _ => DEFAULT_LIMIT,
    }
}

pub fn normalize_page(page: Option<i64>) -> i64 {
    page.unwrap_or(1).max(1)
}

pub fn page_count(total: i64, limit: i64) -> i64 {
    if total == 0 {
        0
    } else {
        (total + limit - 1) / limit
    }
}

/// Create responses carry only the head of the content; the full text stays
/// in the store.
pub fn excerpt(content: &str) -> String {
    if content.chars().count() > EXCERPT_CHARS {
        format!("{}...", truncate_chars(content, EXCERPT_CHARS))
    } else {
        content.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_request() -> CreatePostRequest {
        CreatePostRequest {
            title: "Atlas Rising".into(),
            content: "<p>body</p>".into(),
            cover_image: None,
            tags: vec![],
            author_name: Some("Jane".into()),
            author_id: Some("User-1".into()),
            status: None,
        }
    }

    #[test]
    fn sanitize_requires_title_content_and_author_id() {
        let mut req = base_request();
        req.title = "   ".into();
        assert!(sanitize_new_post(req).is_err());

        let mut req = base_request();
        req.content = "".into();
        assert!(sanitize_new_post(req).is_err());

        let mut req = base_request();
        req.author_id = None;
        assert!(sanitize_new_post(req).is_err());
    }

    #[test]
    fn sanitize_normalizes_author_id_and_defaults() {
        let mut req = base_request();
        req.author_id = Some("  User-1  ".into());
        req.author_name = Some("   ".into());
        let post = sanitize_new_post(req).unwrap();
        assert_eq!(post.author_id, "user-1");
        assert_eq!(post.author_name, "Anonymous");
        assert_eq!(post.status, "published");
    }

    #[test]
    fn sanitize_truncates_title_and_author_name() {
        let mut req = base_request();
        req.title = "t".repeat(500);
        req.author_name = Some("n".repeat(300));
        let post = sanitize_new_post(req).unwrap();
        assert_eq!(post.title.chars().count(), MAX_TITLE_CHARS);
        assert_eq!(post.author_name.chars().count(), MAX_AUTHOR_NAME_CHARS);
    }

    #[test]
    fn sanitize_filters_and_caps_tags() {
        let mut req = base_request();
        let mut tags: Vec<serde_json::Value> =
            (0..10).map(|i| json!(format!("Tag-{i}"))).collect();
        tags.push(json!(""));
        tags.push(json!("x".repeat(80)));
        tags.push(json!(42)); // non-string, dropped
        assert_eq!(tags.len(), 13);
        req.tags = tags;

        let post = sanitize_new_post(req).unwrap();
        assert!(post.tags.len() <= MAX_TAGS);
        assert!(post.tags.iter().all(|t| !t.is_empty()));
        assert!(post.tags.iter().all(|t| t.chars().count() <= MAX_TAG_CHARS));
        assert!(post.tags.iter().all(|t| t == &t.to_lowercase()));
    }

    #[test]
    fn sanitize_whitelists_status() {
        let mut req = base_request();
        req.status = Some("draft".into());
        assert_eq!(sanitize_new_post(req).unwrap().status, "draft");

        let mut req = base_request();
        req.status = Some("archived".into());
        assert_eq!(sanitize_new_post(req).unwrap().status, "published");
    }

    #[test]
    fn sanitize_validates_cover_image_url() {
        let mut req = base_request();
        req.cover_image = Some("https://cdn.example.com/a.jpg".into());
        assert_eq!(
            sanitize_new_post(req).unwrap().cover_image.as_deref(),
            Some("https://cdn.example.com/a.jpg")
        );

        let mut req = base_request();
        req.cover_image = Some("not a url".into());
        assert!(sanitize_new_post(req).is_err());

        let mut req = base_request();
        req.cover_image = Some("".into());
        assert_eq!(sanitize_new_post(req).unwrap().cover_image, None);
    }

    #[test]
    fn author_id_rule_matches_case_insensitively_after_normalization() {
        assert!(can_modify("a1", "Jane", "a1", None));
        assert!(can_modify("a1", "Jane", "  A1  ", None));
        assert!(!can_modify("a1", "Jane", "a2", None));
    }

    #[test]
    fn name_never_grants_access_when_an_author_id_is_stored() {
        assert!(!can_modify("a1", "Jane", "someone-else", Some("Jane")));
        assert!(!can_modify("a1", "Jane", "", Some("Jane")));
    }

    #[test]
    fn legacy_posts_fall_back_to_the_display_name() {
        assert!(can_modify("", "Jane", "whoever", Some("jane")));
        assert!(can_modify("  ", "Jane", "whoever", Some("JANE ")));
        assert!(!can_modify("", "Jane", "whoever", Some("john")));
        assert!(!can_modify("", "Jane", "whoever", None));
        assert!(!can_modify("", "Jane", "whoever", Some("   ")));
    }

    #[test]
    fn limit_is_clamped_into_range() {
        assert_eq!(normalize_limit(Some(200)), 50);
        assert_eq!(normalize_limit(Some(0)), 10);
        assert_eq!(normalize_limit(Some(-3)), 10);
        assert_eq!(normalize_limit(None), 10);
        assert_eq!(normalize_limit(Some(25)), 25);
    }

    #[test]
    fn page_is_clamped_to_one() {
        assert_eq!(normalize_page(Some(0)), 1);
        assert_eq!(normalize_page(Some(-1)), 1);
        assert_eq!(normalize_page(None), 1);
        assert_eq!(normalize_page(Some(4)), 4);
    }

    #[test]
    fn page_count_is_ceiling_of_total_over_limit() {
        assert_eq!(page_count(0, 10), 0);
        assert_eq!(page_count(1, 10), 1);
        assert_eq!(page_count(10, 10), 1);
        assert_eq!(page_count(11, 10), 2);
        assert_eq!(page_count(101, 50), 3);
    }

    #[test]
    fn search_pattern_escapes_like_wildcards() {
        assert_eq!(search_pattern("atlas"), "%atlas%");
        assert_eq!(search_pattern("50% off"), "%50\\% off%");
        assert_eq!(search_pattern("a_b"), "%a\\_b%");
        assert_eq!(search_pattern("back\\slash"), "%back\\\\slash%");
    }

    #[test]
    fn excerpt_truncates_long_content_only() {
        assert_eq!(excerpt("short"), "short");
        let long = "x".repeat(300);
        let cut = excerpt(&long);
        assert_eq!(cut.chars().count(), EXCERPT_CHARS + 3);
        assert!(cut.ends_with("..."));
    }
}
