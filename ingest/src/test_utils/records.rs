//! Builders for realistic record fixtures.

use chrono::{DateTime, TimeZone, Utc};

use crate::types::{Author, Label, PullRequest, PullRequestState, RepositoryRef};

/// Midnight UTC on the given day.
pub fn utc(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

/// A fully populated open pull request fixture.
pub fn sample_pr(
    id: &str,
    title: &str,
    author: &str,
    repo_full_name: &str,
    created_at: DateTime<Utc>,
) -> PullRequest {
    let (owner, name) = repo_full_name
        .split_once('/')
        .unwrap_or(("acme", repo_full_name));

    PullRequest {
        id: id.to_owned(),
        number: 1,
        title: title.to_owned(),
        body: None,
        state: PullRequestState::Open,
        additions: 2,
        deletions: 2,
        ci_status: None,
        created_at,
        updated_at: created_at,
        merged_at: None,
        closed_at: None,
        url: format!("https://github.com/{repo_full_name}/pull/{id}"),
        base_ref: "main".to_owned(),
        head_ref: format!("renovate/{id}"),
        author: Some(Author {
            login: author.to_owned(),
            avatar_url: format!("https://avatars.example/{author}"),
        }),
        labels: vec![Label {
            id: format!("LBL_{id}"),
            name: "dependencies".to_owned(),
            color: "0366d6".to_owned(),
            description: None,
        }],
        repository: RepositoryRef {
            id: format!("REPO_{repo_full_name}"),
            name: name.to_owned(),
            full_name: repo_full_name.to_owned(),
            owner_login: owner.to_owned(),
        },
    }
}

/// A minimal fixture in `repo`, titled after its id.
pub fn pr_in_repo(id: &str, repo_full_name: &str, created_at: DateTime<Utc>) -> PullRequest {
    sample_pr(
        id,
        &format!("Update dependency {id} to v1"),
        "app/renovate",
        repo_full_name,
        created_at,
    )
}

/// A batch of fixtures with sequential ids, all created at `created_at`.
pub fn pr_batch(prefix: &str, count: usize, created_at: DateTime<Utc>) -> Vec<PullRequest> {
    (0..count)
        .map(|index| {
            pr_in_repo(
                &format!("{prefix}_{index}"),
                "acme/api",
                created_at,
            )
        })
        .collect()
}
