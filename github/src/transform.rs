//! Transformation of raw search responses into the internal record model.
//!
//! The upstream schema marks many fields as nullable that the application
//! requires, and search edges can contain non-pull-request nodes. Every
//! node is validated before it becomes a record; incomplete nodes are
//! skipped rather than failing the page.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use ingest::client::SearchPage;
use ingest::error::IngestResult;
use ingest::types::{Author, CiStatus, Label, PullRequest, PullRequestState, RepositoryRef};

#[derive(Debug, Deserialize)]
pub struct SearchData {
    pub search: SearchConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchConnection {
    pub issue_count: u64,
    pub page_info: PageInfo,
    #[serde(default)]
    pub edges: Vec<Option<SearchEdge>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchEdge {
    pub node: Option<RawPullRequest>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPullRequest {
    pub id: Option<String>,
    pub number: Option<u64>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub state: Option<String>,
    pub additions: Option<u64>,
    pub deletions: Option<u64>,
    pub commits: Option<RawCommits>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub base_ref_name: Option<String>,
    pub head_ref_name: Option<String>,
    pub author: Option<RawAuthor>,
    pub labels: Option<RawLabels>,
    pub repository: Option<RawRepository>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawCommits {
    #[serde(default)]
    pub nodes: Vec<Option<RawCommitNode>>,
}

#[derive(Debug, Deserialize)]
pub struct RawCommitNode {
    pub commit: Option<RawCommit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCommit {
    pub status_check_rollup: Option<RawStatusCheckRollup>,
}

#[derive(Debug, Deserialize)]
pub struct RawStatusCheckRollup {
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAuthor {
    pub login: String,
    #[serde(default)]
    pub avatar_url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawLabels {
    #[serde(default)]
    pub nodes: Vec<Option<RawLabel>>,
}

#[derive(Debug, Deserialize)]
pub struct RawLabel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRepository {
    pub id: String,
    pub name: String,
    pub name_with_owner: String,
    pub owner: RawOwner,
}

#[derive(Debug, Deserialize)]
pub struct RawOwner {
    pub login: String,
}

/// Parses the `data` payload of a search response into a [`SearchPage`].
///
/// Nodes missing required fields are skipped with a debug log; the page's
/// total match count is preserved either way since cap detection relies on
/// it even when individual nodes are unusable.
pub fn parse_search_page(data: serde_json::Value) -> IngestResult<SearchPage> {
    let data: SearchData = serde_json::from_value(data)?;
    let connection = data.search;

    let records = connection
        .edges
        .into_iter()
        .flatten()
        .filter_map(|edge| edge.node)
        .filter_map(|node| match transform_record(node) {
            Some(record) => Some(record),
            None => {
                debug!("skipping search node with missing required fields");
                None
            }
        })
        .collect();

    Ok(SearchPage {
        records,
        total_matches: connection.issue_count,
        has_next_page: connection.page_info.has_next_page,
        end_cursor: connection.page_info.end_cursor,
    })
}

/// Builds a record from a raw node, or `None` when required fields are
/// missing.
pub fn transform_record(raw: RawPullRequest) -> Option<PullRequest> {
    let ci_status = extract_ci_status(&raw);

    let state = match raw.state.as_deref()? {
        "OPEN" => PullRequestState::Open,
        "MERGED" => PullRequestState::Merged,
        "CLOSED" => PullRequestState::Closed,
        _ => return None,
    };

    let repository = raw.repository?;

    Some(PullRequest {
        id: raw.id?,
        number: raw.number?,
        title: raw.title?,
        body: raw.body,
        state,
        additions: raw.additions.unwrap_or(0),
        deletions: raw.deletions.unwrap_or(0),
        ci_status,
        created_at: raw.created_at?,
        updated_at: raw.updated_at?,
        merged_at: raw.merged_at,
        closed_at: raw.closed_at,
        url: raw.url?,
        base_ref: raw.base_ref_name?,
        head_ref: raw.head_ref_name?,
        author: raw.author.map(|author| Author {
            login: author.login,
            avatar_url: author.avatar_url,
        }),
        labels: raw
            .labels
            .unwrap_or_default()
            .nodes
            .into_iter()
            .flatten()
            .map(|label| Label {
                id: label.id,
                name: label.name,
                color: label.color,
                description: label.description,
            })
            .collect(),
        repository: RepositoryRef {
            id: repository.id,
            name: repository.name,
            full_name: repository.name_with_owner,
            owner_login: repository.owner.login,
        },
    })
}

/// Maps the head commit's rolled-up check state onto [`CiStatus`].
fn extract_ci_status(raw: &RawPullRequest) -> Option<CiStatus> {
    let state = raw
        .commits
        .as_ref()?
        .nodes
        .first()?
        .as_ref()?
        .commit
        .as_ref()?
        .status_check_rollup
        .as_ref()?
        .state
        .as_deref()?;

    match state {
        "SUCCESS" => Some(CiStatus::Success),
        "FAILURE" | "ERROR" => Some(CiStatus::Failure),
        "PENDING" | "EXPECTED" => Some(CiStatus::Pending),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_node() -> serde_json::Value {
        json!({
            "id": "PR_node1",
            "number": 42,
            "title": "Update dependency serde to v1.0.200",
            "body": "Automated update.",
            "state": "OPEN",
            "additions": 2,
            "deletions": 2,
            "commits": {
                "nodes": [
                    { "commit": { "statusCheckRollup": { "state": "ERROR" } } }
                ]
            },
            "createdAt": "2024-03-01T10:00:00Z",
            "updatedAt": "2024-03-02T10:00:00Z",
            "mergedAt": null,
            "closedAt": null,
            "url": "https://github.com/acme/api/pull/42",
            "baseRefName": "main",
            "headRefName": "renovate/serde-1.x",
            "author": { "login": "app/renovate", "avatarUrl": "https://avatars.example/renovate" },
            "labels": { "nodes": [ { "id": "LBL_1", "name": "dependencies", "color": "0366d6", "description": null } ] },
            "repository": {
                "id": "REPO_1",
                "name": "api",
                "nameWithOwner": "acme/api",
                "owner": { "login": "acme" }
            }
        })
    }

    #[test]
    fn parses_a_full_search_payload() {
        let data = json!({
            "search": {
                "issueCount": 1234,
                "pageInfo": { "hasNextPage": true, "endCursor": "Y3Vyc29yOjEwMA==" },
                "edges": [
                    { "node": raw_node() },
                    // Non-PR nodes deserialize as empty objects and are skipped.
                    { "node": {} },
                    null
                ]
            }
        });

        let page = parse_search_page(data).unwrap();

        assert_eq!(page.total_matches, 1234);
        assert!(page.has_next_page);
        assert_eq!(page.end_cursor.as_deref(), Some("Y3Vyc29yOjEwMA=="));
        assert_eq!(page.records.len(), 1);

        let record = &page.records[0];
        assert_eq!(record.id, "PR_node1");
        assert_eq!(record.state, PullRequestState::Open);
        assert_eq!(record.ci_status, Some(CiStatus::Failure));
        assert_eq!(record.repository.full_name, "acme/api");
        assert_eq!(record.labels[0].name, "dependencies");
    }

    #[test]
    fn node_without_required_fields_is_skipped() {
        let mut node = raw_node();
        node["url"] = serde_json::Value::Null;

        let data = json!({
            "search": {
                "issueCount": 1,
                "pageInfo": { "hasNextPage": false, "endCursor": null },
                "edges": [ { "node": node } ]
            }
        });

        let page = parse_search_page(data).unwrap();
        assert!(page.records.is_empty());
        // The cap signal survives even when nodes are unusable.
        assert_eq!(page.total_matches, 1);
    }

    #[test]
    fn missing_author_stays_none() {
        let mut node = raw_node();
        node["author"] = serde_json::Value::Null;

        let raw: RawPullRequest = serde_json::from_value(node).unwrap();
        let record = transform_record(raw).unwrap();
        assert!(record.author.is_none());
    }

    #[test]
    fn expected_rollup_maps_to_pending() {
        let mut node = raw_node();
        node["commits"]["nodes"][0]["commit"]["statusCheckRollup"]["state"] = json!("EXPECTED");

        let raw: RawPullRequest = serde_json::from_value(node).unwrap();
        let record = transform_record(raw).unwrap();
        assert_eq!(record.ci_status, Some(CiStatus::Pending));
    }
}
