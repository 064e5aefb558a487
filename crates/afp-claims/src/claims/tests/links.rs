use super::common::*;
use crate::accounts::{AccountDirectory, UserId};
use crate::claims::domain::{EligibilityStatus, ReviewDecision};
use crate::claims::forms::FormSubmission;
use crate::claims::links::service::ALREADY_LINKED;
use crate::claims::links::LinkFilter;
use crate::claims::repository::LinkRepository;
use crate::claims::service::ClaimServiceError;
use crate::claims::validation::INVALID_CHOICE;

fn link_submission(user: UserId, role: impl ToString) -> FormSubmission {
    FormSubmission::new()
        .with_field("user", user.to_string())
        .with_field("role", role.to_string())
}

#[test]
fn owner_links_a_colleague_once() {
    let fixture = fixture();
    let (grants, links) = fixture.grant_services();
    let grant = grants
        .create(fixture.owner.id, &fixture.grant_submission())
        .expect("grant created");

    let link = links
        .add(
            &fixture.owner.id,
            &grant.id,
            &link_submission(fixture.colleague.id, fixture.co_investigator.id),
        )
        .expect("linked");
    assert_eq!(link.user, fixture.colleague.id);
    assert_eq!(link.details.role.name, "Co-Investigator");
    assert_eq!(link.eligibility, EligibilityStatus::NotReviewed);

    match links.add(
        &fixture.owner.id,
        &grant.id,
        &link_submission(fixture.colleague.id, fixture.co_investigator.id),
    ) {
        Err(ClaimServiceError::Validation(errors)) => {
            assert_eq!(errors.get("user"), Some(&[ALREADY_LINKED.to_string()][..]));
        }
        other => panic!("expected duplicate link rejection, got {other:?}"),
    }
}

#[test]
fn inactive_or_unknown_users_cannot_be_linked() {
    let fixture = fixture();
    let (grants, links) = fixture.grant_services();
    let grant = grants
        .create(fixture.owner.id, &fixture.grant_submission())
        .expect("grant created");

    let mut archived = fixture.colleague.clone();
    archived.is_active = false;
    fixture.accounts.update(archived).expect("deactivated");

    for user in [fixture.colleague.id, UserId::generate()] {
        match links.add(
            &fixture.owner.id,
            &grant.id,
            &link_submission(user, fixture.co_investigator.id),
        ) {
            Err(ClaimServiceError::Validation(errors)) => {
                assert_eq!(errors.get("user"), Some(&[INVALID_CHOICE.to_string()][..]));
            }
            other => panic!("expected invalid user, got {other:?}"),
        }
    }
}

#[test]
fn only_the_owner_manages_links() {
    let fixture = fixture();
    let (grants, links) = fixture.grant_services();
    let grant = grants
        .create(fixture.owner.id, &fixture.grant_submission())
        .expect("grant created");

    assert!(matches!(
        links.add(
            &fixture.colleague.id,
            &grant.id,
            &link_submission(fixture.owner.id, fixture.co_investigator.id),
        ),
        Err(ClaimServiceError::NotFound)
    ));
    assert!(matches!(
        links.list(&fixture.colleague.id, &grant.id),
        Err(ClaimServiceError::NotFound)
    ));
}

#[test]
fn deleting_the_parent_cascades_to_links() {
    let fixture = fixture();
    let (grants, links) = fixture.grant_services();
    let grant = grants
        .create(fixture.owner.id, &fixture.grant_submission())
        .expect("grant created");
    links
        .add(
            &fixture.owner.id,
            &grant.id,
            &link_submission(fixture.colleague.id, fixture.co_investigator.id),
        )
        .expect("linked");

    grants
        .delete(&fixture.owner.id, &grant.id)
        .expect("deleted");

    assert!(links.repository().list().expect("list").is_empty());
}

#[test]
fn links_are_reviewed_independently_of_the_claim() {
    let fixture = fixture();
    let (grants, links) = fixture.grant_services();
    let grant = grants
        .create(fixture.owner.id, &fixture.grant_submission())
        .expect("grant created");
    let link = links
        .add(
            &fixture.owner.id,
            &grant.id,
            &link_submission(fixture.colleague.id, fixture.co_investigator.id),
        )
        .expect("linked");

    links
        .review(
            &link.id,
            ReviewDecision {
                eligibility: EligibilityStatus::Eligible,
                decision_comments: None,
            },
        )
        .expect("reviewed");

    let eligible = links
        .list_all(&LinkFilter {
            parent: Some(grant.id),
            eligibility: Some(EligibilityStatus::Eligible),
        })
        .expect("filtered");
    assert_eq!(eligible.len(), 1);
    assert_eq!(
        grants.fetch_any(&grant.id).expect("grant").eligibility,
        EligibilityStatus::NotReviewed
    );

    links
        .remove(&fixture.owner.id, &grant.id, &link.id)
        .expect("removed");
    assert_eq!(links.count().expect("count"), 0);
}
