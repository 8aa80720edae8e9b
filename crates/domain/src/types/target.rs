//! What a task polls.
//!
//! Each target resolves to an endpoint path, a parameter set and whether
//! the request must carry a WBI signature. The fetcher only sees the
//! resolved [`PollRequest`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// What a task polls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PollTarget {
    /// Follower / following counts of a user.
    FollowerStat { mid: u64 },
    /// Video metadata and statistics.
    VideoStat { bvid: String },
    /// Live "currently watching" count of a video part.
    VideoOnline { bvid: String, cid: u64 },
    /// A single dynamic (feed post).
    DynamicDetail { id: String },
    /// First page of hot comments under an image dynamic.
    DynamicComments {
        oid: String,
        #[serde(default = "default_comment_type")]
        comment_type: u32,
    },
    /// Any other endpoint.
    Custom {
        endpoint: String,
        #[serde(default)]
        params: BTreeMap<String, String>,
        #[serde(default)]
        signed: bool,
    },
}

const fn default_comment_type() -> u32 {
    11
}

/// Resolved request for a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRequest {
    pub endpoint: String,
    pub params: BTreeMap<String, String>,
    /// Whether the query must carry `wts`/`w_rid`.
    pub signed: bool,
}

impl PollRequest {
    fn new<const N: usize>(endpoint: &str, params: [(&str, String); N], signed: bool) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            params: params.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            signed,
        }
    }
}

impl PollTarget {
    /// Endpoint, query and signing flag for this target.
    pub fn request(&self) -> PollRequest {
        match self {
            Self::FollowerStat { mid } => {
                PollRequest::new("/x/relation/stat", [("vmid", mid.to_string())], true)
            }
            Self::VideoStat { bvid } => {
                PollRequest::new("/x/web-interface/view", [("bvid", bvid.clone())], false)
            }
            Self::VideoOnline { bvid, cid } => PollRequest::new(
                "/x/player/online/total",
                [("bvid", bvid.clone()), ("cid", cid.to_string())],
                false,
            ),
            Self::DynamicDetail { id } => PollRequest::new(
                "/x/polymer/web-dynamic/v1/detail",
                [
                    ("id", id.clone()),
                    ("timezone_offset", "-480".to_string()),
                    ("features", "itemOpusStyle,opusBigCover,onlyfansVote".to_string()),
                ],
                true,
            ),
            Self::DynamicComments { oid, comment_type } => PollRequest::new(
                "/x/v2/reply/wbi/main",
                [
                    ("type", comment_type.to_string()),
                    ("oid", oid.clone()),
                    ("mode", "3".to_string()),
                    ("plat", "1".to_string()),
                    ("web_location", "1315875".to_string()),
                    ("seek_rpid", String::new()),
                    ("pagination_str", r#"{"offset": ""}"#.to_string()),
                ],
                true,
            ),
            Self::Custom { endpoint, params, signed } => PollRequest {
                endpoint: endpoint.clone(),
                params: params.clone(),
                signed: *signed,
            },
        }
    }
}
