//! End-to-end tests for the task workflow engine: permission checks, the
//! submit/review cycle, bulk updates, deletion, and the audit trail, all
//! driven through the same service layer a transport would use.

use chrono::{Duration, Utc};
use deskd::{
    audit::AuditQuery,
    config::DeskConfig,
    directory::{Actor, NewDepartment, NewStaff, StaffStatus},
    error::OpsError,
    policy::{Action, Module, Role},
    workflow::{BulkChange, NewTask, Priority, ReviewAction, TaskChange, TaskStatus},
    AppContext,
};

struct Desk {
    ctx: AppContext,
    admin: Actor,
    chief: Actor,
    reporter: Actor,
    department_id: String,
    _dir: tempfile::TempDir,
}

/// Fresh storage in a tempdir with an admin, a chief editor, a reporter,
/// and one department.
async fn desk() -> Desk {
    let dir = tempfile::tempdir().unwrap();
    let config = DeskConfig::new(Some(dir.path().to_path_buf()), Some("warn".to_string()));
    let ctx = AppContext::bootstrap(config).await.unwrap();

    let admin = ctx
        .directory
        .bootstrap_admin("root", "root@desk.test", "Root Admin", "root-pw")
        .await
        .unwrap();
    let department = ctx
        .directory
        .create_department(
            &admin,
            &NewDepartment {
                name: "Politics".to_string(),
                description: None,
                leader_id: None,
            },
        )
        .await
        .unwrap();

    let chief = staff(&ctx, &admin, "meredith", Role::ChiefEditor, &department.id).await;
    let reporter = staff(&ctx, &admin, "jo", Role::Reporter, &department.id).await;

    Desk {
        ctx,
        admin,
        chief,
        reporter,
        department_id: department.id,
        _dir: dir,
    }
}

async fn staff(ctx: &AppContext, admin: &Actor, username: &str, role: Role, dept: &str) -> Actor {
    let row = ctx
        .directory
        .create_staff(
            admin,
            &NewStaff {
                username: username.to_string(),
                email: format!("{username}@desk.test"),
                full_name: format!("{username} Example"),
                password: "pw".to_string(),
                role,
                department_id: Some(dept.to_string()),
                position: None,
            },
        )
        .await
        .unwrap();
    row.actor().unwrap()
}

fn new_task(desk: &Desk, title: &str) -> NewTask {
    NewTask {
        title: title.to_string(),
        description: "write it up".to_string(),
        assignee_id: desk.reporter.id.clone(),
        department_id: desk.department_id.clone(),
        priority: Priority::Medium,
        due_date: Utc::now() + Duration::days(3),
        article_id: None,
    }
}

async fn audit_count(desk: &Desk, module: Module) -> usize {
    desk.ctx
        .audit
        .query(
            &desk.admin,
            &AuditQuery {
                module: Some(module),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .len()
}

// ─── Creation ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_starts_at_todo_not_submitted() {
    let desk = desk().await;
    let task = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &new_task(&desk, "budget piece"))
        .await
        .unwrap();

    assert_eq!(task.status, "todo");
    assert_eq!(task.submission_status, "not_submitted");
    assert!(task.started_at.is_none());
    assert_eq!(task.revision, 0);

    let detail = desk
        .ctx
        .workflow
        .get_task(&desk.chief, &task.id)
        .await
        .unwrap();
    assert_eq!(detail.updates.len(), 1);
    assert_eq!(detail.updates[0].kind, "created");
}

#[tokio::test]
async fn reporter_cannot_create_tasks() {
    let desk = desk().await;
    let err = desk
        .ctx
        .workflow
        .create_task(&desk.reporter, &new_task(&desk, "nope"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OpsError::PermissionDenied {
            module: Module::TaskAssignment,
            action: Action::Create
        }
    ));
}

#[tokio::test]
async fn create_rejects_unknown_or_disabled_assignee() {
    let desk = desk().await;

    let mut payload = new_task(&desk, "ghost assignee");
    payload.assignee_id = "no-such-user".to_string();
    let err = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &payload)
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Validation { field: "assignee_id", .. }));

    desk.ctx
        .directory
        .set_staff_status(&desk.admin, &desk.reporter.id, StaffStatus::Disabled)
        .await
        .unwrap();
    let err = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &new_task(&desk, "disabled assignee"))
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Validation { field: "assignee_id", .. }));
}

#[tokio::test]
async fn create_notifies_the_assignee() {
    let desk = desk().await;
    // No broadcast subscribers exist; the operation must still succeed.
    let task = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &new_task(&desk, "notify me"))
        .await
        .unwrap();

    let inbox = desk
        .ctx
        .notifier
        .list(&desk.reporter.id, true, 10, 0)
        .await
        .unwrap();
    assert_eq!(inbox.unread, 1);
    assert_eq!(inbox.items[0].kind, "task_assigned");
    assert_eq!(inbox.items[0].link.as_deref(), Some(format!("/tasks/{}", task.id).as_str()));
}

// ─── Editing ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn assignee_edits_without_edit_capability() {
    let desk = desk().await;
    let task = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &new_task(&desk, "my task"))
        .await
        .unwrap();

    // The reporter holds no task-assignment/edit capability but is the assignee.
    let updated = desk
        .ctx
        .workflow
        .edit_task(
            &desk.reporter,
            &task.id,
            &[TaskChange::Status {
                value: TaskStatus::InProgress,
            }],
            None,
        )
        .await
        .unwrap();
    assert_eq!(updated.status, "in_progress");
    assert!(updated.started_at.is_some());
}

#[tokio::test]
async fn started_at_is_stamped_exactly_once() {
    let desk = desk().await;
    let task = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &new_task(&desk, "start twice"))
        .await
        .unwrap();

    let first = desk
        .ctx
        .workflow
        .edit_task(
            &desk.chief,
            &task.id,
            &[TaskChange::Status {
                value: TaskStatus::InProgress,
            }],
            None,
        )
        .await
        .unwrap();
    let started = first.started_at.clone().unwrap();

    desk.ctx
        .workflow
        .edit_task(
            &desk.chief,
            &task.id,
            &[TaskChange::Status {
                value: TaskStatus::Blocked,
            }],
            None,
        )
        .await
        .unwrap();
    let again = desk
        .ctx
        .workflow
        .edit_task(
            &desk.chief,
            &task.id,
            &[TaskChange::Status {
                value: TaskStatus::InProgress,
            }],
            None,
        )
        .await
        .unwrap();
    assert_eq!(again.started_at.unwrap(), started);
}

#[tokio::test]
async fn mixed_edit_writes_one_record_tagged_by_dominant_change() {
    let desk = desk().await;
    let task = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &new_task(&desk, "mixed edit"))
        .await
        .unwrap();

    desk.ctx
        .workflow
        .edit_task(
            &desk.chief,
            &task.id,
            &[
                TaskChange::Title {
                    value: "mixed edit v2".to_string(),
                },
                TaskChange::Priority {
                    value: Priority::Urgent,
                },
                TaskChange::Status {
                    value: TaskStatus::InProgress,
                },
            ],
            None,
        )
        .await
        .unwrap();

    let detail = desk
        .ctx
        .workflow
        .get_task(&desk.chief, &task.id)
        .await
        .unwrap();
    // One "created" record plus exactly one record for the whole change-set.
    assert_eq!(detail.updates.len(), 2);
    assert_eq!(detail.updates[0].kind, "status_changed");
}

#[tokio::test]
async fn failed_reassignment_leaves_no_partial_edit() {
    let desk = desk().await;
    let task = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &new_task(&desk, "atomic edit"))
        .await
        .unwrap();

    let err = desk
        .ctx
        .workflow
        .edit_task(
            &desk.chief,
            &task.id,
            &[
                TaskChange::Priority {
                    value: Priority::Urgent,
                },
                TaskChange::Assignee {
                    user_id: "no-such-user".to_string(),
                },
            ],
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Validation { field: "assignee_id", .. }));

    // The priority change from the same request must not have stuck.
    let detail = desk
        .ctx
        .workflow
        .get_task(&desk.chief, &task.id)
        .await
        .unwrap();
    assert_eq!(detail.task.priority, "medium");
    assert_eq!(detail.updates.len(), 1);
}

#[tokio::test]
async fn stale_revision_is_a_conflict() {
    let desk = desk().await;
    let task = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &new_task(&desk, "concurrent"))
        .await
        .unwrap();

    desk.ctx
        .workflow
        .edit_task(
            &desk.chief,
            &task.id,
            &[TaskChange::Priority {
                value: Priority::High,
            }],
            Some(task.revision),
        )
        .await
        .unwrap();

    // Second writer still holds the pre-edit revision.
    let err = desk
        .ctx
        .workflow
        .edit_task(
            &desk.chief,
            &task.id,
            &[TaskChange::Priority {
                value: Priority::Low,
            }],
            Some(task.revision),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::StateConflict(_)));

    let detail = desk
        .ctx
        .workflow
        .get_task(&desk.chief, &task.id)
        .await
        .unwrap();
    assert_eq!(detail.task.priority, "high");
}

#[tokio::test]
async fn disabled_actor_is_rejected_before_capabilities() {
    let desk = desk().await;
    let task = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &new_task(&desk, "frozen out"))
        .await
        .unwrap();

    let mut disabled_chief = desk.chief.clone();
    disabled_chief.status = StaffStatus::Disabled;
    let err = desk
        .ctx
        .workflow
        .edit_task(
            &disabled_chief,
            &task.id,
            &[TaskChange::Priority {
                value: Priority::Low,
            }],
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Authentication(_)));
}

// ─── Submit and review ────────────────────────────────────────────────────────

#[tokio::test]
async fn assignee_submit_sets_pending_review() {
    let desk = desk().await;
    let task = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &new_task(&desk, "submit me"))
        .await
        .unwrap();

    let submitted = desk
        .ctx
        .workflow
        .submit_task(&desk.reporter, &task.id, None)
        .await
        .unwrap();
    assert_eq!(submitted.submission_status, "pending_review");
    assert!(submitted.submitted_at.is_some());
    assert!(submitted.reviewed_at.is_none());

    let detail = desk
        .ctx
        .workflow
        .get_task(&desk.chief, &task.id)
        .await
        .unwrap();
    assert_eq!(detail.updates[0].kind, "submitted");
}

#[tokio::test]
async fn non_assignee_cannot_submit() {
    let desk = desk().await;
    let task = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &new_task(&desk, "not yours"))
        .await
        .unwrap();

    // Even the chief editor cannot submit someone else's task.
    let err = desk
        .ctx
        .workflow
        .submit_task(&desk.chief, &task.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Forbidden(_)));

    let detail = desk
        .ctx
        .workflow
        .get_task(&desk.chief, &task.id)
        .await
        .unwrap();
    assert_eq!(detail.task.submission_status, "not_submitted");
    assert!(detail.task.submitted_at.is_none());
}

#[tokio::test]
async fn double_submit_is_a_conflict() {
    let desk = desk().await;
    let task = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &new_task(&desk, "twice"))
        .await
        .unwrap();

    desk.ctx
        .workflow
        .submit_task(&desk.reporter, &task.id, None)
        .await
        .unwrap();
    let err = desk
        .ctx
        .workflow
        .submit_task(&desk.reporter, &task.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::StateConflict(_)));
}

#[tokio::test]
async fn submit_binds_an_article_once() {
    let desk = desk().await;
    let article = desk
        .ctx
        .workflow
        .create_article(&desk.reporter, "draft piece")
        .await
        .unwrap();
    let task = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &new_task(&desk, "with article"))
        .await
        .unwrap();

    let submitted = desk
        .ctx
        .workflow
        .submit_task(&desk.reporter, &task.id, Some(&article.id))
        .await
        .unwrap();
    assert_eq!(submitted.article_id.as_deref(), Some(article.id.as_str()));

    // A later submit with a different article leaves the first binding alone.
    desk.ctx
        .workflow
        .review_task(
            &desk.chief,
            &task.id,
            ReviewAction::RequestRevision,
            Some("tighten the intro"),
        )
        .await
        .unwrap();
    let other = desk
        .ctx
        .workflow
        .create_article(&desk.reporter, "second draft")
        .await
        .unwrap();
    let resubmitted = desk
        .ctx
        .workflow
        .submit_task(&desk.reporter, &task.id, Some(&other.id))
        .await
        .unwrap();
    assert_eq!(resubmitted.article_id.as_deref(), Some(article.id.as_str()));
}

#[tokio::test]
async fn approve_completes_the_task() {
    let desk = desk().await;
    let task = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &new_task(&desk, "approve me"))
        .await
        .unwrap();
    desk.ctx
        .workflow
        .submit_task(&desk.reporter, &task.id, None)
        .await
        .unwrap();

    let reviewed = desk
        .ctx
        .workflow
        .review_task(&desk.chief, &task.id, ReviewAction::Approve, None)
        .await
        .unwrap();
    assert_eq!(reviewed.status, "completed");
    assert_eq!(reviewed.submission_status, "approved");
    assert!(reviewed.completed_at.is_some());
    assert!(reviewed.reviewed_at.is_some());
    assert_eq!(reviewed.reviewer_id.as_deref(), Some(desk.chief.id.as_str()));
}

#[tokio::test]
async fn revision_request_returns_task_to_todo_with_notes() {
    let desk = desk().await;
    let task = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &new_task(&desk, "needs work"))
        .await
        .unwrap();
    desk.ctx
        .workflow
        .edit_task(
            &desk.reporter,
            &task.id,
            &[TaskChange::Status {
                value: TaskStatus::InProgress,
            }],
            None,
        )
        .await
        .unwrap();
    desk.ctx
        .workflow
        .submit_task(&desk.reporter, &task.id, None)
        .await
        .unwrap();

    let reviewed = desk
        .ctx
        .workflow
        .review_task(
            &desk.chief,
            &task.id,
            ReviewAction::RequestRevision,
            Some("fix lede"),
        )
        .await
        .unwrap();
    assert_eq!(reviewed.status, "todo");
    assert_eq!(reviewed.submission_status, "revision_requested");
    assert_eq!(reviewed.revision_notes.as_deref(), Some("fix lede"));
    assert!(reviewed.reviewed_at.is_some());
    assert_eq!(reviewed.reviewer_id.as_deref(), Some(desk.chief.id.as_str()));
}

#[tokio::test]
async fn revision_request_requires_notes() {
    let desk = desk().await;
    let task = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &new_task(&desk, "silent revision"))
        .await
        .unwrap();
    desk.ctx
        .workflow
        .submit_task(&desk.reporter, &task.id, None)
        .await
        .unwrap();

    for notes in [None, Some(""), Some("   ")] {
        let err = desk
            .ctx
            .workflow
            .review_task(&desk.chief, &task.id, ReviewAction::RequestRevision, notes)
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::Validation { field: "revision_notes", .. }));
    }
}

#[tokio::test]
async fn review_outside_pending_is_a_conflict_and_changes_nothing() {
    let desk = desk().await;
    let task = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &new_task(&desk, "not pending"))
        .await
        .unwrap();

    let err = desk
        .ctx
        .workflow
        .review_task(&desk.chief, &task.id, ReviewAction::Approve, None)
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::StateConflict(_)));

    let detail = desk
        .ctx
        .workflow
        .get_task(&desk.chief, &task.id)
        .await
        .unwrap();
    assert_eq!(detail.task.status, "todo");
    assert_eq!(detail.task.submission_status, "not_submitted");
    assert!(detail.task.reviewed_at.is_none());
    assert!(detail.task.reviewer_id.is_none());
}

#[tokio::test]
async fn reporter_cannot_review() {
    let desk = desk().await;
    let task = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &new_task(&desk, "self review"))
        .await
        .unwrap();
    desk.ctx
        .workflow
        .submit_task(&desk.reporter, &task.id, None)
        .await
        .unwrap();

    let err = desk
        .ctx
        .workflow
        .review_task(&desk.reporter, &task.id, ReviewAction::Approve, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OpsError::PermissionDenied {
            module: Module::TaskAssignment,
            action: Action::Approve
        }
    ));
}

#[tokio::test]
async fn approved_task_status_is_frozen() {
    let desk = desk().await;
    let task = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &new_task(&desk, "final"))
        .await
        .unwrap();
    desk.ctx
        .workflow
        .submit_task(&desk.reporter, &task.id, None)
        .await
        .unwrap();
    desk.ctx
        .workflow
        .review_task(&desk.chief, &task.id, ReviewAction::Approve, None)
        .await
        .unwrap();

    let err = desk
        .ctx
        .workflow
        .edit_task(
            &desk.chief,
            &task.id,
            &[TaskChange::Status {
                value: TaskStatus::Todo,
            }],
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::StateConflict(_)));
}

// ─── Bulk update ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn bulk_update_skips_missing_ids_and_writes_no_history() {
    let desk = desk().await;
    let a = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &new_task(&desk, "bulk a"))
        .await
        .unwrap();
    let b = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &new_task(&desk, "bulk b"))
        .await
        .unwrap();

    let updated = desk
        .ctx
        .workflow
        .bulk_update_tasks(
            &desk.chief,
            &[a.id.clone(), b.id.clone(), "missing-c".to_string()],
            &[BulkChange::Status {
                value: TaskStatus::Completed,
            }],
        )
        .await
        .unwrap();
    assert_eq!(updated, 2);

    for id in [&a.id, &b.id] {
        let detail = desk.ctx.workflow.get_task(&desk.chief, id).await.unwrap();
        assert_eq!(detail.task.status, "completed");
        assert!(detail.task.completed_at.is_some());
        // Only the "created" record — the bulk path adds no per-task history.
        assert_eq!(detail.updates.len(), 1);
        assert!(detail.task.updated_at >= detail.task.created_at);
    }
}

#[tokio::test]
async fn bulk_update_validates_the_target_assignee_up_front() {
    let desk = desk().await;
    let a = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &new_task(&desk, "bulk reassign"))
        .await
        .unwrap();

    let err = desk
        .ctx
        .workflow
        .bulk_update_tasks(
            &desk.chief,
            &[a.id.clone()],
            &[BulkChange::Assignee {
                user_id: "no-such-user".to_string(),
            }],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Validation { field: "assignee_id", .. }));

    let detail = desk.ctx.workflow.get_task(&desk.chief, &a.id).await.unwrap();
    assert_eq!(detail.task.assignee_id, desk.reporter.id);
}

#[tokio::test]
async fn bulk_update_requires_edit_capability() {
    let desk = desk().await;
    let err = desk
        .ctx
        .workflow
        .bulk_update_tasks(
            &desk.reporter,
            &["anything".to_string()],
            &[BulkChange::Priority {
                value: Priority::Low,
            }],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::PermissionDenied { .. }));
}

// ─── Delete ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_refuses_while_an_article_is_linked() {
    let desk = desk().await;
    let article = desk
        .ctx
        .workflow
        .create_article(&desk.reporter, "bound piece")
        .await
        .unwrap();
    let mut payload = new_task(&desk, "linked");
    payload.article_id = Some(article.id.clone());
    let task = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &payload)
        .await
        .unwrap();

    let err = desk
        .ctx
        .workflow
        .delete_task(&desk.admin, &task.id)
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::StateConflict(_)));

    // Unlinking makes it deletable.
    desk.ctx
        .workflow
        .unlink_article(&desk.chief, &task.id)
        .await
        .unwrap();
    desk.ctx.workflow.delete_task(&desk.admin, &task.id).await.unwrap();
}

#[tokio::test]
async fn delete_removes_update_history() {
    let desk = desk().await;
    let task = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &new_task(&desk, "short lived"))
        .await
        .unwrap();
    desk.ctx
        .workflow
        .submit_task(&desk.reporter, &task.id, None)
        .await
        .unwrap();

    desk.ctx.workflow.delete_task(&desk.admin, &task.id).await.unwrap();

    let err = desk
        .ctx
        .workflow
        .get_task(&desk.chief, &task.id)
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::NotFound { .. }));

    let pool = desk.ctx.storage.pool();
    let (orphans,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM task_updates WHERE task_id = ?")
            .bind(&task.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(orphans, 0);
}

#[tokio::test]
async fn department_head_cannot_delete() {
    let desk = desk().await;
    let head = staff(&desk.ctx, &desk.admin, "sam", Role::DepartmentHead, &desk.department_id).await;
    let task = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &new_task(&desk, "protected"))
        .await
        .unwrap();

    let err = desk
        .ctx
        .workflow
        .delete_task(&head, &task.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OpsError::PermissionDenied {
            module: Module::TaskAssignment,
            action: Action::Delete
        }
    ));
}

// ─── Audit trail ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn every_workflow_mutation_audits_exactly_once() {
    let desk = desk().await;
    let base = audit_count(&desk, Module::TaskAssignment).await;

    let task = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &new_task(&desk, "audited"))
        .await
        .unwrap();
    assert_eq!(audit_count(&desk, Module::TaskAssignment).await, base + 1);

    desk.ctx
        .workflow
        .edit_task(
            &desk.chief,
            &task.id,
            &[TaskChange::Priority {
                value: Priority::High,
            }],
            None,
        )
        .await
        .unwrap();
    assert_eq!(audit_count(&desk, Module::TaskAssignment).await, base + 2);

    desk.ctx
        .workflow
        .submit_task(&desk.reporter, &task.id, None)
        .await
        .unwrap();
    assert_eq!(audit_count(&desk, Module::TaskAssignment).await, base + 3);

    desk.ctx
        .workflow
        .review_task(&desk.chief, &task.id, ReviewAction::Approve, None)
        .await
        .unwrap();
    assert_eq!(audit_count(&desk, Module::TaskAssignment).await, base + 4);

    desk.ctx.workflow.delete_task(&desk.admin, &task.id).await.unwrap();
    assert_eq!(audit_count(&desk, Module::TaskAssignment).await, base + 5);
}

#[tokio::test]
async fn failed_operations_leave_no_audit_entries() {
    let desk = desk().await;
    let base = audit_count(&desk, Module::TaskAssignment).await;

    let _ = desk
        .ctx
        .workflow
        .create_task(&desk.reporter, &new_task(&desk, "denied"))
        .await
        .unwrap_err();
    let mut payload = new_task(&desk, "bad assignee");
    payload.assignee_id = "nobody".to_string();
    let _ = desk
        .ctx
        .workflow
        .create_task(&desk.chief, &payload)
        .await
        .unwrap_err();

    assert_eq!(audit_count(&desk, Module::TaskAssignment).await, base);
}

// ─── Stats ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stats_count_by_status_and_completion_rate() {
    let desk = desk().await;
    for title in ["s1", "s2", "s3", "s4"] {
        desk.ctx
            .workflow
            .create_task(&desk.chief, &new_task(&desk, title))
            .await
            .unwrap();
    }
    let page = desk
        .ctx
        .workflow
        .list_tasks(&desk.chief, &Default::default())
        .await
        .unwrap();
    let first_id = page.items[0].id.clone();
    desk.ctx
        .workflow
        .bulk_update_tasks(
            &desk.chief,
            &[first_id],
            &[BulkChange::Status {
                value: TaskStatus::Completed,
            }],
        )
        .await
        .unwrap();

    let stats = desk
        .ctx
        .workflow
        .task_stats(&desk.chief, &Default::default())
        .await
        .unwrap();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.by_status["completed"], 1);
    assert_eq!(stats.by_status["todo"], 3);
    assert!((stats.completion_rate - 25.0).abs() < f64::EPSILON);
    // All three open tasks are due within the week.
    assert_eq!(stats.due_this_week, 3);
    assert_eq!(stats.overdue, 0);
}
