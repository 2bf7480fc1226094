//! Open cases of an account that concern one cluster

use crate::error::BotError;
use csbot_hydra::{Backend, Case, CaseComment};

/// Searches the whole comment records (author and ids included), not just bodies.
fn comments_mention(comments: &[CaseComment], cluster: &str) -> Result<bool, BotError> {
    let rendered = serde_json::to_string(comments).map_err(anyhow::Error::from)?;
    Ok(rendered.contains(cluster))
}

/// Open cases whose comments mention `cluster`.
///
/// Comments are fetched case by case, uncached; any failed fetch fails the
/// whole lookup.
pub async fn relevant_cases(
    backend: &dyn Backend,
    account: &str,
    cluster: &str,
) -> Result<Vec<Case>, BotError> {
    let mut relevant = Vec::new();
    for case in backend.open_cases(account).await? {
        let comments = backend.case_comments(&case.number).await?;
        if comments_mention(&comments, cluster)? {
            relevant.push(case);
        }
    }
    Ok(relevant)
}

pub fn case_line(case: &Case) -> String {
    format!(
        "Case {} ({}, {}): {}",
        case.number, case.created_date, case.owner.name, case.subject
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;
    use csbot_hydra::CaseOwner;

    fn case(number: &str) -> Case {
        Case {
            number: number.to_string(),
            created_date: "2020-02-03".to_string(),
            owner: CaseOwner {
                name: "Sam".to_string(),
            },
            subject: format!("case {}", number),
        }
    }

    #[tokio::test]
    async fn keeps_only_cases_mentioning_cluster() {
        let backend = FakeBackend::default();
        backend.add_case("acct", case("1"), &["unrelated chatter"]);
        backend.add_case("acct", case("2"), &["first", "cluster abc is degraded"]);
        backend.add_case("acct", case("3"), &[]);

        let cases = relevant_cases(&backend, "acct", "abc").await.expect("cases");
        let numbers: Vec<&str> = cases.iter().map(|c| c.number.as_str()).collect();
        assert_eq!(numbers, vec!["2"]);
    }

    #[tokio::test]
    async fn mention_outside_comment_body_counts() {
        let backend = FakeBackend::default();
        backend.add_case_comments(
            "acct",
            case("4"),
            vec![CaseComment {
                id: Some("c-1".to_string()),
                created_by: Some("abc-automation".to_string()),
                body: "nightly check".to_string(),
            }],
        );
        backend.add_case("acct", case("5"), &["nightly check"]);

        let cases = relevant_cases(&backend, "acct", "abc").await.expect("cases");
        let numbers: Vec<&str> = cases.iter().map(|c| c.number.as_str()).collect();
        assert_eq!(numbers, vec!["4"]);
    }

    #[tokio::test]
    async fn comment_fetch_failure_fails_the_lookup() {
        let backend = FakeBackend::default();
        backend.add_case("acct", case("1"), &["abc"]);
        backend.fail_case_comments("1");

        let err = relevant_cases(&backend, "acct", "abc")
            .await
            .expect_err("failure propagates");
        assert!(matches!(err, BotError::Collaborator(_)));
    }

    #[test]
    fn case_line_includes_owner_and_date() {
        assert_eq!(case_line(&case("7")), "Case 7 (2020-02-03, Sam): case 7");
    }
}
