//! Mutation behavior over the in-memory backend: nested writes, soft
//! delete, version history, cascades, hooks, globals and change events.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use asupersync::runtime::RuntimeBuilder;
use tessera::prelude::*;
use tessera::{ChangeOperation, MemoryChangeLog, VersionOperation};

fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

fn unwrap_err<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Err(e) => e,
        other => panic!("expected an error, got {other:?}"),
    }
}

fn titles(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.get_str("title").map(str::to_string))
        .collect()
}

#[test]
fn soft_delete_round_trip_keeps_identity() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async {
        let notes = Collection::new("notes")
            .field(FieldDef::text("title").required())
            .soft_delete(true);
        let log = Arc::new(MemoryChangeLog::new());
        let engine = Engine::builder()
            .collection(notes)
            .sink(log.clone())
            .build()
            .expect("valid collections");
        let conn = MemoryConnection::new();
        let ctx = Context::system(&cx, &conn);
        unwrap_outcome(engine.migrate(&ctx).await);
        let api = engine.collection("notes").expect("notes");

        let created = unwrap_outcome(api.create(&ctx, Data::new().set("title", "keep me")).await);
        let id = created.id().expect("id").to_string();

        let deleted = unwrap_outcome(api.delete_by_id(&ctx, &id).await);
        assert!(deleted.success);
        let visible = unwrap_outcome(api.find(&ctx, &FindOptions::new()).await);
        assert!(visible.docs.is_empty());
        let all = unwrap_outcome(
            api.find(&ctx, &FindOptions::new().include_deleted(true))
                .await,
        );
        assert_eq!(all.docs.len(), 1);
        assert_eq!(all.docs[0].id(), Some(id.as_str()));
        assert!(all.docs[0].get("deletedAt").is_some_and(|v| !v.is_null()));

        assert!(
            unwrap_err(
                api.update_by_id(&ctx, &id, Data::new().set("title", "x"))
                    .await
            )
            .is_not_found()
        );

        let restored = unwrap_outcome(api.restore_by_id(&ctx, &id).await);
        assert_eq!(restored.id(), Some(id.as_str()));
        assert!(restored.get("deletedAt").is_none_or(Value::is_null));
        let visible = unwrap_outcome(api.find(&ctx, &FindOptions::new()).await);
        assert_eq!(visible.docs.len(), 1);
        assert_eq!(visible.docs[0].id(), Some(id.as_str()));

        // The row never left the table.
        assert_eq!(unwrap_outcome(conn.rows(&cx, "notes").await).len(), 1);

        let operations: Vec<_> = log.events().iter().map(|e| e.operation).collect();
        assert_eq!(
            operations,
            vec![
                ChangeOperation::Create,
                ChangeOperation::Delete,
                ChangeOperation::Restore
            ]
        );
    });
}

#[test]
fn versions_are_contiguous_and_revert_appends() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async {
        let pages = Collection::new("pages")
            .field(FieldDef::text("title").required())
            .field(FieldDef::text("body").localized())
            .versioned(None);
        let engine = Engine::builder()
            .collection(pages)
            .config(EngineConfig::new().locales(["en", "sk"]))
            .build()
            .expect("valid collections");
        let conn = MemoryConnection::new();
        let ctx = Context::system(&cx, &conn).with_user("editor");
        unwrap_outcome(engine.migrate(&ctx).await);
        let api = engine.collection("pages").expect("pages");

        let created = unwrap_outcome(
            api.create(&ctx, Data::new().set("title", "v1").set("body", "first"))
                .await,
        );
        let id = created.id().expect("id").to_string();
        for (title, body) in [("v2", "second"), ("v3", "third")] {
            unwrap_outcome(
                api.update_by_id(&ctx, &id, Data::new().set("title", title).set("body", body))
                    .await,
            );
        }

        let ascending = FindVersionsOptions::new().order(Direction::Asc);
        let versions = unwrap_outcome(api.find_versions(&ctx, &id, &ascending).await);
        let numbers: Vec<u64> = versions.iter().map(|v| v.version_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(versions[0].operation, VersionOperation::Create);
        assert_eq!(versions[2].operation, VersionOperation::Update);
        assert_eq!(versions[0].user_id.as_deref(), Some("editor"));
        assert_eq!(versions[1].fields.get_str("title"), Some("v2"));

        let reverted = unwrap_outcome(api.revert_to_version(&ctx, &id, VersionRef::Number(1)).await);
        assert_eq!(reverted.get_str("title"), Some("v1"));
        assert_eq!(reverted.get_str("body"), Some("first"));

        let versions = unwrap_outcome(api.find_versions(&ctx, &id, &ascending).await);
        assert_eq!(versions.len(), 4);
        assert_eq!(versions[3].version_number, 4);
        assert_eq!(versions[3].operation, VersionOperation::Update);
        assert_eq!(versions[3].fields.get_str("title"), Some("v1"));

        let by_id = VersionRef::Id(versions[2].version_id.clone());
        let reverted = unwrap_outcome(api.revert_to_version(&ctx, &id, by_id).await);
        assert_eq!(reverted.get_str("title"), Some("v3"));

        unwrap_outcome(api.delete_by_id(&ctx, &id).await);
        let newest = unwrap_outcome(
            api.find_versions(&ctx, &id, &FindVersionsOptions::new().limit(2))
                .await,
        );
        assert_eq!(newest.len(), 2);
        assert_eq!(newest[0].version_number, 6);
        assert_eq!(newest[0].operation, VersionOperation::Delete);
        assert_eq!(newest[0].fields.get_str("title"), Some("v3"));
        assert_eq!(newest[1].version_number, 5);
    });
}

#[test]
fn version_history_is_pruned_to_the_cap() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async {
        let pages = Collection::new("pages")
            .field(FieldDef::text("title").required())
            .versioned(Some(2));
        let engine = Engine::builder()
            .collection(pages)
            .build()
            .expect("valid collections");
        let conn = MemoryConnection::new();
        let ctx = Context::system(&cx, &conn);
        unwrap_outcome(engine.migrate(&ctx).await);
        let api = engine.collection("pages").expect("pages");

        let created = unwrap_outcome(api.create(&ctx, Data::new().set("title", "a")).await);
        let id = created.id().expect("id").to_string();
        for title in ["b", "c", "d"] {
            unwrap_outcome(
                api.update_by_id(&ctx, &id, Data::new().set("title", title))
                    .await,
            );
        }
        let versions = unwrap_outcome(
            api.find_versions(&ctx, &id, &FindVersionsOptions::new().order(Direction::Asc))
                .await,
        );
        let numbers: Vec<u64> = versions.iter().map(|v| v.version_number).collect();
        assert_eq!(numbers, vec![3, 4]);
    });
}

#[test]
fn connect_or_create_reuses_the_matching_record() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async {
        let tags = Collection::new("tags").field(FieldDef::text("name").required());
        let post_tags = Collection::new("postTags")
            .field(FieldDef::text("postId").required())
            .field(FieldDef::text("tagId").required());
        let posts = Collection::new("posts")
            .field(FieldDef::text("title").required())
            .relation(
                "tags",
                Relation::many_to_many("tags", "postTags", "postId", "tagId")
                    .on_delete(CascadeAction::Cascade),
            );
        let engine = Engine::builder()
            .collections([tags, post_tags, posts])
            .build()
            .expect("valid collections");
        let conn = MemoryConnection::new();
        let ctx = Context::system(&cx, &conn);
        unwrap_outcome(engine.migrate(&ctx).await);
        let post_api = engine.collection("posts").expect("posts");
        let tag_api = engine.collection("tags").expect("tags");

        for title in ["first", "second"] {
            unwrap_outcome(
                post_api
                    .create(
                        &ctx,
                        Data::new().set("title", title).connect_or_create(
                            "tags",
                            Where::eq("name", "X"),
                            Data::new().set("name", "X"),
                        ),
                    )
                    .await,
            );
        }

        let x_tags = unwrap_outcome(
            tag_api
                .count(&ctx, &CountOptions::new().filter(Where::eq("name", "X")))
                .await,
        );
        assert_eq!(x_tags, 1);

        let tagged = unwrap_outcome(
            post_api
                .find(
                    &ctx,
                    &FindOptions::new()
                        .filter(Where::some("tags", Where::eq("name", "X")))
                        .order_by(OrderBy::asc("title"))
                        .with("tags", RelationQuery::new()),
                )
                .await,
        );
        assert_eq!(titles(&tagged.docs), vec!["first", "second"]);
        assert!(tagged.docs.iter().all(|p| p.many("tags").len() == 1));

        // Disconnect removes only the junction row.
        let first = tagged.docs[0].id().expect("id").to_string();
        let updated = unwrap_outcome(
            post_api
                .update_by_id(
                    &ctx,
                    &first,
                    Data::new().disconnect("tags", Where::eq("name", "X")),
                )
                .await,
        );
        assert_eq!(updated.id(), Some(first.as_str()));
        assert_eq!(unwrap_outcome(conn.rows(&cx, "postTags").await).len(), 1);
        assert_eq!(unwrap_outcome(conn.rows(&cx, "tags").await).len(), 1);
    });
}

#[test]
fn failed_nested_create_leaves_no_rows() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async {
        let authors = Collection::new("authors")
            .field(FieldDef::text("name").required())
            .relation("posts", Relation::has_many("posts", "authorId"));
        let posts = Collection::new("posts")
            .field(FieldDef::text("title").required())
            .field(FieldDef::text("authorId"));
        let engine = Engine::builder()
            .collections([authors, posts])
            .build()
            .expect("valid collections");
        let conn = MemoryConnection::new();
        let ctx = Context::system(&cx, &conn);
        unwrap_outcome(engine.migrate(&ctx).await);
        let api = engine.collection("authors").expect("authors");

        let err = unwrap_err(
            api.create(
                &ctx,
                Data::new()
                    .set("name", "Ada")
                    .create("posts", Data::new().set("title", "fine"))
                    .create("posts", Data::new()),
            )
            .await,
        );
        assert!(err.is_validation());
        assert!(unwrap_outcome(conn.rows(&cx, "authors").await).is_empty());
        assert!(unwrap_outcome(conn.rows(&cx, "posts").await).is_empty());
    });
}

#[test]
fn cascade_reaches_every_level() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async {
        let comment_deletes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&comment_deletes);
        let authors = Collection::new("authors").field(FieldDef::text("name").required());
        let posts = Collection::new("posts")
            .field(FieldDef::text("title").required())
            .field(FieldDef::text("authorId"))
            .relation(
                "author",
                Relation::belongs_to("authors", "authorId").on_delete(CascadeAction::Cascade),
            );
        let comments = Collection::new("comments")
            .field(FieldDef::text("body").required())
            .field(FieldDef::text("postId"))
            .relation(
                "post",
                Relation::belongs_to("posts", "postId").on_delete(CascadeAction::Cascade),
            )
            .after_delete(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        let engine = Engine::builder()
            .collections([authors, posts, comments])
            .build()
            .expect("valid collections");
        let conn = MemoryConnection::new();
        let ctx = Context::system(&cx, &conn);
        unwrap_outcome(engine.migrate(&ctx).await);
        let author_api = engine.collection("authors").expect("authors");
        let post_api = engine.collection("posts").expect("posts");
        let comment_api = engine.collection("comments").expect("comments");

        let author = unwrap_outcome(author_api.create(&ctx, Data::new().set("name", "Ada")).await);
        let author_id = author.id().expect("id").to_string();
        for p in 0..2 {
            let post = unwrap_outcome(
                post_api
                    .create(
                        &ctx,
                        Data::new()
                            .set("title", format!("post {p}"))
                            .set("authorId", author_id.as_str()),
                    )
                    .await,
            );
            let post_id = post.id().expect("id").to_string();
            for c in 0..3 {
                unwrap_outcome(
                    comment_api
                        .create(
                            &ctx,
                            Data::new()
                                .set("body", format!("comment {c}"))
                                .set("postId", post_id.as_str()),
                        )
                        .await,
                );
            }
        }

        let result = unwrap_outcome(author_api.delete_by_id(&ctx, &author_id).await);
        assert_eq!(result.count, 1);
        for table in ["authors", "posts", "comments"] {
            assert!(
                unwrap_outcome(conn.rows(&cx, table).await).is_empty(),
                "{table} should be empty"
            );
        }
        assert_eq!(comment_deletes.load(Ordering::SeqCst), 6);
    });
}

#[test]
fn restrict_and_set_null_dependents() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async {
        let categories = Collection::new("categories").field(FieldDef::text("name").required());
        let editors = Collection::new("editors").field(FieldDef::text("name").required());
        let posts = Collection::new("posts")
            .field(FieldDef::text("title").required())
            .field(FieldDef::text("categoryId"))
            .field(FieldDef::text("editorId"))
            .relation(
                "category",
                Relation::belongs_to("categories", "categoryId").on_delete(CascadeAction::Restrict),
            )
            .relation(
                "editor",
                Relation::belongs_to("editors", "editorId").on_delete(CascadeAction::SetNull),
            );
        let engine = Engine::builder()
            .collections([categories, editors, posts])
            .build()
            .expect("valid collections");
        let conn = MemoryConnection::new();
        let ctx = Context::system(&cx, &conn);
        unwrap_outcome(engine.migrate(&ctx).await);
        let category_api = engine.collection("categories").expect("categories");
        let editor_api = engine.collection("editors").expect("editors");
        let post_api = engine.collection("posts").expect("posts");

        let category = unwrap_outcome(category_api.create(&ctx, Data::new().set("name", "News")).await);
        let category_id = category.id().expect("id").to_string();
        let post = unwrap_outcome(
            post_api
                .create(
                    &ctx,
                    Data::new()
                        .set("title", "hello")
                        .connect("category", Where::eq("name", "News"))
                        .create("editor", Data::new().set("name", "Eve")),
                )
                .await,
        );
        let post_id = post.id().expect("id").to_string();
        let editor_id = post.get_str("editorId").expect("editor linked").to_string();

        let err = unwrap_err(category_api.delete_by_id(&ctx, &category_id).await);
        match err {
            Error::RestrictedDelete(restricted) => {
                assert_eq!(restricted.dependent, "posts");
                assert_eq!(restricted.count, 1);
            }
            other => panic!("expected a restricted delete, got {other}"),
        }
        assert_eq!(unwrap_outcome(conn.rows(&cx, "categories").await).len(), 1);

        unwrap_outcome(editor_api.delete_by_id(&ctx, &editor_id).await);
        let post = unwrap_outcome(
            post_api
                .find_one(&ctx, &FindOptions::new().filter(Where::eq("id", post_id.as_str())))
                .await,
        )
        .expect("post survives");
        assert!(post.get("editorId").is_some_and(Value::is_null));

        unwrap_outcome(post_api.delete_by_id(&ctx, &post_id).await);
        unwrap_outcome(category_api.delete_by_id(&ctx, &category_id).await);
    });
}

#[test]
fn hooks_abort_before_and_surface_after_failures() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async {
        let notes = Collection::new("notes")
            .field(FieldDef::text("title").required())
            .field(FieldDef::text("slug"))
            .before_create(|_, mut row| {
                let slug = row.get_str("title").map(|t| t.to_lowercase().replace(' ', "-"));
                if let Some(slug) = slug {
                    row.set("slug", slug);
                }
                Ok(row)
            })
            .before_delete(|_, row| {
                if row.get_str("title") == Some("Pinned") {
                    return Err(Error::Custom("pinned notes stay".into()));
                }
                Ok(row)
            })
            .after_update(|ctx, _| {
                if ctx.original.as_ref().and_then(|o| o.get_str("title")) == Some("Fragile") {
                    return Err(Error::Custom("queue unavailable".into()));
                }
                Ok(())
            });
        let engine = Engine::builder()
            .collection(notes)
            .build()
            .expect("valid collections");
        let conn = MemoryConnection::new();
        let ctx = Context::system(&cx, &conn);
        unwrap_outcome(engine.migrate(&ctx).await);
        let api = engine.collection("notes").expect("notes");

        let pinned = unwrap_outcome(api.create(&ctx, Data::new().set("title", "Pinned")).await);
        assert_eq!(pinned.get_str("slug"), Some("pinned"));
        let pinned_id = pinned.id().expect("id").to_string();
        assert!(matches!(
            unwrap_err(api.delete_by_id(&ctx, &pinned_id).await),
            Error::HookAbort(_)
        ));
        assert_eq!(unwrap_outcome(conn.rows(&cx, "notes").await).len(), 1);

        let fragile = unwrap_outcome(api.create(&ctx, Data::new().set("title", "Fragile")).await);
        let fragile_id = fragile.id().expect("id").to_string();
        assert!(matches!(
            unwrap_err(
                api.update_by_id(&ctx, &fragile_id, Data::new().set("title", "Sturdy"))
                    .await
            ),
            Error::HookFailed(_)
        ));
        // The write committed before the hook ran.
        let stored = unwrap_outcome(
            api.find_one(&ctx, &FindOptions::new().filter(Where::eq("id", fragile_id.as_str())))
                .await,
        )
        .expect("note");
        assert_eq!(stored.get_str("title"), Some("Sturdy"));
    });
}

#[test]
fn global_is_created_on_first_use() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async {
        let settings = Collection::global("settings")
            .field(FieldDef::text("siteName").default_value("Untitled"))
            .versioned(None);
        let engine = Engine::builder()
            .collection(settings)
            .build()
            .expect("valid collections");
        assert!(engine.collection("settings").is_err());
        let conn = MemoryConnection::new();
        let ctx = Context::system(&cx, &conn);
        unwrap_outcome(engine.migrate(&ctx).await);
        let api = engine.global("settings").expect("settings");

        assert!(
            unwrap_outcome(api.find_versions(&ctx, &FindVersionsOptions::new()).await).is_empty()
        );
        let first = unwrap_outcome(api.get(&ctx).await);
        assert_eq!(first.get_str("siteName"), Some("Untitled"));
        let again = unwrap_outcome(api.get(&ctx).await);
        assert_eq!(first.id(), again.id());

        let updated = unwrap_outcome(api.update(&ctx, Data::new().set("siteName", "Tessera")).await);
        assert_eq!(updated.get_str("siteName"), Some("Tessera"));
        assert_eq!(unwrap_outcome(conn.rows(&cx, "settings").await).len(), 1);

        let versions = unwrap_outcome(api.find_versions(&ctx, &FindVersionsOptions::new()).await);
        assert_eq!(versions.len(), 2);
        let reverted = unwrap_outcome(api.revert_to_version(&ctx, VersionRef::Number(1)).await);
        assert_eq!(reverted.get_str("siteName"), Some("Untitled"));
    });
}

#[test]
fn revert_leaves_soft_deleted_records_deleted() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async {
        let notes = Collection::new("notes")
            .field(FieldDef::text("title").required())
            .soft_delete(true)
            .versioned(None);
        let log = Arc::new(MemoryChangeLog::new());
        let engine = Engine::builder()
            .collection(notes)
            .sink(log.clone())
            .build()
            .expect("valid collections");
        let conn = MemoryConnection::new();
        let ctx = Context::system(&cx, &conn);
        unwrap_outcome(engine.migrate(&ctx).await);
        let api = engine.collection("notes").expect("notes");

        let created = unwrap_outcome(api.create(&ctx, Data::new().set("title", "draft")).await);
        let id = created.id().expect("id").to_string();
        unwrap_outcome(api.delete_by_id(&ctx, &id).await);

        let err = unwrap_err(api.revert_to_version(&ctx, &id, VersionRef::Number(1)).await);
        assert!(err.is_not_found());
        assert_eq!(unwrap_outcome(api.count(&ctx, &CountOptions::new()).await), 0);
        assert!(
            unwrap_err(
                api.update_by_id(&ctx, &id, Data::new().set("title", "x"))
                    .await
            )
            .is_not_found()
        );

        // Only restore brings the record back.
        unwrap_outcome(api.restore_by_id(&ctx, &id).await);
        let reverted = unwrap_outcome(api.revert_to_version(&ctx, &id, VersionRef::Number(1)).await);
        assert_eq!(reverted.get_str("title"), Some("draft"));
        assert!(reverted.get("deletedAt").is_none_or(Value::is_null));
        let operations: Vec<_> = log.events().iter().map(|e| e.operation).collect();
        assert_eq!(
            operations,
            vec![
                ChangeOperation::Create,
                ChangeOperation::Delete,
                ChangeOperation::Restore,
                ChangeOperation::Revert
            ]
        );
    });
}

#[test]
fn batch_update_hands_each_original_to_after_hooks() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let tasks = Collection::new("tasks")
            .field(FieldDef::text("title").required())
            .field(FieldDef::text("status"))
            .after_update(move |ctx, row| {
                let before = ctx
                    .original
                    .as_ref()
                    .and_then(|o| o.get_str("status"))
                    .map(str::to_string);
                let after = row.get_str("status").map(str::to_string);
                let title = row.get_str("title").map(str::to_string);
                recorder
                    .lock()
                    .expect("recorder lock")
                    .push((title, before, after));
                Ok(())
            });
        let engine = Engine::builder()
            .collection(tasks)
            .build()
            .expect("valid collections");
        let conn = MemoryConnection::new();
        let ctx = Context::system(&cx, &conn);
        unwrap_outcome(engine.migrate(&ctx).await);
        let api = engine.collection("tasks").expect("tasks");

        for (title, status) in [("a", "open"), ("b", "blocked"), ("c", "done")] {
            unwrap_outcome(
                api.create(&ctx, Data::new().set("title", title).set("status", status))
                    .await,
            );
        }
        let updated = unwrap_outcome(
            api.update(
                &ctx,
                &Where::field("status", FieldOp::In(vec!["open".into(), "blocked".into()])),
                Data::new().set("status", "closed"),
            )
            .await,
        );
        assert_eq!(updated.len(), 2);

        let mut seen = seen.lock().expect("recorder lock").clone();
        seen.sort();
        let some = |s: &str| Some(s.to_string());
        assert_eq!(
            seen,
            vec![
                (some("a"), some("open"), some("closed")),
                (some("b"), some("blocked"), some("closed")),
            ]
        );
    });
}

#[test]
fn invalid_payload_fails_before_nested_parent_writes() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async {
        let author_hooks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&author_hooks);
        let authors = Collection::new("authors")
            .field(FieldDef::text("name").required())
            .before_create(move |_, row| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(row)
            });
        let posts = Collection::new("posts")
            .field(FieldDef::text("title").required())
            .field(FieldDef::text("authorId").required())
            .relation("author", Relation::belongs_to("authors", "authorId"));
        let engine = Engine::builder()
            .collections([authors, posts])
            .build()
            .expect("valid collections");
        let conn = MemoryConnection::new();
        let ctx = Context::system(&cx, &conn);
        unwrap_outcome(engine.migrate(&ctx).await);
        let api = engine.collection("posts").expect("posts");

        let err = unwrap_err(
            api.create(
                &ctx,
                Data::new().create("author", Data::new().set("name", "Ada")),
            )
            .await,
        );
        assert!(err.is_validation());
        assert_eq!(author_hooks.load(Ordering::SeqCst), 0);
        assert!(unwrap_outcome(conn.rows(&cx, "authors").await).is_empty());

        // The nested write fills in the required key.
        let post = unwrap_outcome(
            api.create(
                &ctx,
                Data::new()
                    .set("title", "hello")
                    .create("author", Data::new().set("name", "Ada")),
            )
            .await,
        );
        assert!(post.get_str("authorId").is_some());
        assert_eq!(author_hooks.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn deleting_a_linked_target_removes_its_junction_rows() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async {
        let tags = Collection::new("tags").field(FieldDef::text("name").required());
        let post_tags = Collection::new("postTags")
            .field(FieldDef::text("postId").required())
            .field(FieldDef::text("tagId").required());
        let posts = Collection::new("posts")
            .field(FieldDef::text("title").required())
            .relation(
                "tags",
                Relation::many_to_many("tags", "postTags", "postId", "tagId")
                    .on_delete(CascadeAction::Cascade),
            );
        let engine = Engine::builder()
            .collections([tags, post_tags, posts])
            .build()
            .expect("valid collections");
        let conn = MemoryConnection::new();
        let ctx = Context::system(&cx, &conn);
        unwrap_outcome(engine.migrate(&ctx).await);
        let post_api = engine.collection("posts").expect("posts");
        let tag_api = engine.collection("tags").expect("tags");

        let post = unwrap_outcome(
            post_api
                .create(
                    &ctx,
                    Data::new()
                        .set("title", "hello")
                        .create("tags", Data::new().set("name", "rust"))
                        .create("tags", Data::new().set("name", "cms")),
                )
                .await,
        );
        let post_id = post.id().expect("id").to_string();
        assert_eq!(unwrap_outcome(conn.rows(&cx, "postTags").await).len(), 2);

        let deleted = unwrap_outcome(tag_api.delete(&ctx, &Where::eq("name", "rust")).await);
        assert_eq!(deleted.count, 1);
        assert_eq!(unwrap_outcome(conn.rows(&cx, "postTags").await).len(), 1);

        let post = unwrap_outcome(
            post_api
                .find_one(
                    &ctx,
                    &FindOptions::new()
                        .filter(Where::eq("id", post_id.as_str()))
                        .with("tags", RelationQuery::new()),
                )
                .await,
        )
        .expect("post survives");
        let names: Vec<_> = post
            .many("tags")
            .iter()
            .filter_map(|t| t.get_str("name"))
            .collect();
        assert_eq!(names, vec!["cms"]);
    });
}
