use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    #[serde(rename = "userId")]
    pub user_id: u64,
    pub id: u64,
    pub title: String,
    pub body: String,
}

/// Request body for creating or updating a post. Unset fields are left out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDraft {
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl PostDraft {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            user_id: None,
            title: Some(title.into()),
            body: Some(body.into()),
        }
    }
}

/// Sample posts for development when no backend data is wanted
pub fn seed_posts() -> Vec<Post> {
    vec![
        Post {
            user_id: 1,
            id: 1,
            title: "Getting Started with React Native".to_string(),
            body: "React Native is a framework for building native mobile apps using React and JavaScript.".to_string(),
        },
        Post {
            user_id: 1,
            id: 2,
            title: "Understanding Redux Toolkit".to_string(),
            body: "Redux Toolkit is the official, opinionated, batteries-included toolset for efficient Redux development.".to_string(),
        },
        Post {
            user_id: 1,
            id: 3,
            title: "TypeScript Best Practices".to_string(),
            body: "TypeScript adds static typing to JavaScript, helping catch errors early and improve code quality.".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_parse_post() {
        let json = r#"{"userId": 1, "id": 7, "title": "qui est esse", "body": "est rerum tempore"}"#;
        let post: Post = serde_json::from_str(json).expect("Failed to parse post test JSON");
        assert_eq!(post.user_id, 1);
        assert_eq!(post.id, 7);
        assert_eq!(post.title, "qui est esse");
    }

    #[test]
    fn test_draft_skips_unset_fields() {
        let draft = PostDraft {
            title: Some("Renamed".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(&draft).unwrap();
        assert_eq!(value, serde_json::json!({"title": "Renamed"}));
    }

    #[test]
    fn test_seed_posts_have_unique_ids() {
        let posts = seed_posts();
        assert_eq!(posts.len(), 3);
        let ids: HashSet<u64> = posts.iter().map(|p| p.id).collect();
        assert_eq!(ids.len(), posts.len());
    }
}
