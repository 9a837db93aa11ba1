//! Read-side behavior over the in-memory backend: paging, filtering,
//! quantifiers, localization, relation loading and relation aggregates.

use asupersync::runtime::RuntimeBuilder;
use tessera::prelude::*;
use tessera::{AccessMode, CollectionApi, Related};

fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

fn blog() -> Engine {
    let authors = Collection::new("authors")
        .field(FieldDef::text("name").required())
        .relation("posts", Relation::has_many("posts", "authorId"));
    let posts = Collection::new("posts")
        .field(FieldDef::text("title").required())
        .field(FieldDef::text("status").choices(["draft", "published"]))
        .field(FieldDef::integer("viewCount").default_value(0))
        .field(FieldDef::text("authorId"))
        .relation("author", Relation::belongs_to("authors", "authorId"));
    Engine::builder()
        .collections([authors, posts])
        .build()
        .expect("valid collections")
}

fn ids(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.id().map(str::to_string))
        .collect()
}

async fn names(
    api: &CollectionApi<'_>,
    ctx: &Context<'_, MemoryConnection>,
    filter: Where,
) -> Vec<String> {
    let options = FindOptions::new()
        .filter(filter)
        .order_by(OrderBy::asc("name"));
    let page = unwrap_outcome(api.find(ctx, &options).await);
    page.docs
        .iter()
        .filter_map(|r| r.get_str("name").map(str::to_string))
        .collect()
}

async fn name_in(
    api: &CollectionApi<'_>,
    cx: &Cx,
    conn: &MemoryConnection,
    id: &str,
    locale: &str,
) -> Option<String> {
    let ctx = Context::system(cx, conn).with_locale(locale);
    let options = FindOptions::new().filter(Where::eq("id", id));
    let record = unwrap_outcome(api.find_one(&ctx, &options).await).expect("record");
    record.get_str("name").map(str::to_string)
}

#[test]
fn published_posts_over_threshold_by_views() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async {
        let conn = MemoryConnection::new();
        let engine = blog();
        let ctx = Context::system(&cx, &conn);
        unwrap_outcome(engine.migrate(&ctx).await);
        let posts = engine.collection("posts").expect("posts");

        let seed = [
            ("a", "published", 120),
            ("b", "draft", 500),
            ("c", "published", 40),
            ("d", "published", 75),
            ("e", "published", 90),
        ];
        for (title, status, views) in seed {
            unwrap_outcome(
                posts
                    .create(
                        &ctx,
                        Data::new()
                            .set("title", title)
                            .set("status", status)
                            .set("viewCount", views),
                    )
                    .await,
            );
        }

        let options = FindOptions::new()
            .filter(Where::and(vec![
                Where::eq("status", "published"),
                Where::field("viewCount", FieldOp::Gte(Value::from(50))),
            ]))
            .order_by(OrderBy::desc("viewCount"))
            .limit(2);
        let page = unwrap_outcome(posts.find(&ctx, &options).await);

        let titles: Vec<_> = page.docs.iter().filter_map(|r| r.get_str("title")).collect();
        assert_eq!(titles, vec!["a", "e"]);
        assert_eq!(page.info.total_docs, 3);
        assert_eq!(page.info.total_pages, 2);
        assert!(page.info.has_next_page);
        assert_eq!(page.info.next_page, Some(2));
    });
}

#[test]
fn pages_cover_every_match_exactly_once() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async {
        let conn = MemoryConnection::new();
        let engine = blog();
        let ctx = Context::system(&cx, &conn);
        unwrap_outcome(engine.migrate(&ctx).await);
        let posts = engine.collection("posts").expect("posts");

        for n in 0..11 {
            let status = if n % 4 == 0 { "draft" } else { "published" };
            unwrap_outcome(
                posts
                    .create(
                        &ctx,
                        Data::new()
                            .set("title", format!("post {n}"))
                            .set("status", status)
                            .set("viewCount", n),
                    )
                    .await,
            );
        }

        let filter = Where::eq("status", "published");
        for limit in [1_u64, 3, 4, 8, 20] {
            let mut seen = Vec::new();
            let mut offset = 0;
            loop {
                let options = FindOptions::new()
                    .filter(filter.clone())
                    .limit(limit)
                    .offset(offset);
                let page = unwrap_outcome(posts.find(&ctx, &options).await);
                assert_eq!(page.info.total_docs, 8);
                assert_eq!(page.info.total_pages, 8_u64.div_ceil(limit));
                if page.docs.is_empty() {
                    break;
                }
                seen.extend(ids(&page.docs));
                offset += limit;
            }
            assert_eq!(seen.len(), 8, "limit {limit}");
            let mut unique = seen.clone();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), 8, "limit {limit}");
        }

        let count = unwrap_outcome(
            posts
                .count(&ctx, &CountOptions::new().filter(filter))
                .await,
        );
        assert_eq!(count, 8);
    });
}

#[test]
fn relation_quantifiers_follow_set_semantics() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async {
        let tags = Collection::new("tags").field(FieldDef::text("name").required().unique());
        let junction = Collection::new("categoryTags")
            .field(FieldDef::text("categoryId").required())
            .field(FieldDef::text("tagId").required());
        let categories = Collection::new("categories")
            .field(FieldDef::text("name").required())
            .relation(
                "tags",
                Relation::many_to_many("tags", "categoryTags", "categoryId", "tagId"),
            );
        let engine = Engine::builder()
            .collections([tags, junction, categories])
            .build()
            .expect("valid collections");

        let conn = MemoryConnection::new();
        let ctx = Context::system(&cx, &conn);
        unwrap_outcome(engine.migrate(&ctx).await);
        let tag_api = engine.collection("tags").expect("tags");
        let category_api = engine.collection("categories").expect("categories");
        for name in ["A", "B"] {
            unwrap_outcome(tag_api.create(&ctx, Data::new().set("name", name)).await);
        }

        let memberships: [(&str, &[&str]); 4] = [
            ("only-a", &["A"]),
            ("both", &["A", "B"]),
            ("only-b", &["B"]),
            ("untagged", &[]),
        ];
        for (name, tags) in memberships {
            let mut data = Data::new().set("name", name);
            for tag in tags {
                data = data.connect("tags", Where::eq("name", *tag));
            }
            unwrap_outcome(category_api.create(&ctx, data).await);
        }

        let tagged_a = Where::eq("name", "A");
        assert_eq!(
            names(&category_api, &ctx, Where::some("tags", tagged_a.clone())).await,
            vec!["both", "only-a"]
        );
        assert_eq!(
            names(&category_api, &ctx, Where::none("tags", tagged_a.clone())).await,
            vec!["only-b", "untagged"]
        );
        assert_eq!(
            names(&category_api, &ctx, Where::every("tags", tagged_a)).await,
            vec!["only-a", "untagged"]
        );

        let loaded = unwrap_outcome(
            category_api
                .find_one(
                    &ctx,
                    &FindOptions::new()
                        .filter(Where::eq("name", "both"))
                        .with("tags", RelationQuery::new().order_by(OrderBy::asc("name"))),
                )
                .await,
        )
        .expect("category");
        let tag_names: Vec<_> = loaded
            .many("tags")
            .iter()
            .filter_map(|t| t.get_str("name"))
            .collect();
        assert_eq!(tag_names, vec!["A", "B"]);
    });
}

#[test]
fn localized_reads_fall_back_to_default_locale() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async {
        let products = Collection::new("products")
            .field(FieldDef::text("name").required().localized())
            .field(FieldDef::text("sku").required());
        let engine = Engine::builder()
            .collection(products)
            .config(EngineConfig::new().default_locale("en").locales(["en", "sk"]))
            .build()
            .expect("valid collections");

        let conn = MemoryConnection::new();
        let system = Context::system(&cx, &conn);
        unwrap_outcome(engine.migrate(&system).await);
        let api = engine.collection("products").expect("products");

        let created = unwrap_outcome(
            api.create(&system, Data::new().set("name", "Hello").set("sku", "P-1"))
                .await,
        );
        let id = created.id().expect("id").to_string();

        let sk = Context::system(&cx, &conn).with_locale("sk");
        let updated = unwrap_outcome(
            api.update_by_id(&sk, &id, Data::new().set("name", "Ahoj"))
                .await,
        );
        assert_eq!(updated.get_str("name"), Some("Ahoj"));

        assert_eq!(name_in(&api, &cx, &conn, &id, "sk").await.as_deref(), Some("Ahoj"));
        assert_eq!(name_in(&api, &cx, &conn, &id, "en").await.as_deref(), Some("Hello"));
        assert_eq!(name_in(&api, &cx, &conn, &id, "de").await.as_deref(), Some("Hello"));

        // Filters see the coalesced value too.
        let sk = Context::system(&cx, &conn).with_locale("sk");
        let found = unwrap_outcome(
            api.count(&sk, &CountOptions::new().filter(Where::eq("name", "Ahoj")))
                .await,
        );
        assert_eq!(found, 1);

        let de = Context::system(&cx, &conn).with_locale("de");
        let err = match api.update_by_id(&de, &id, Data::new().set("name", "Hallo")).await {
            Outcome::Err(e) => e,
            other => panic!("expected a locale error, got {other:?}"),
        };
        assert!(err.is_validation());
    });
}

#[test]
fn aggregates_over_empty_relations_are_zeroed() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async {
        let conn = MemoryConnection::new();
        let engine = blog();
        let ctx = Context::system(&cx, &conn);
        unwrap_outcome(engine.migrate(&ctx).await);
        let authors = engine.collection("authors").expect("authors");

        let busy = unwrap_outcome(
            authors
                .create(
                    &ctx,
                    Data::new()
                        .set("name", "Busy")
                        .create(
                            "posts",
                            Data::new().set("title", "one").set("viewCount", 10),
                        )
                        .create(
                            "posts",
                            Data::new().set("title", "two").set("viewCount", 30),
                        ),
                )
                .await,
        );
        unwrap_outcome(authors.create(&ctx, Data::new().set("name", "Idle")).await);

        let request = AggregateRequest::new()
            .count()
            .sum("viewCount")
            .avg("viewCount")
            .max("viewCount");
        let options = FindOptions::new()
            .order_by(OrderBy::asc("name"))
            .with("posts", RelationQuery::new().aggregate(request));
        let page = unwrap_outcome(authors.find(&ctx, &options).await);
        assert_eq!(page.docs.len(), 2);

        let busy_agg = page.docs[0].aggregate("posts").expect("aggregate");
        assert_eq!(page.docs[0].id(), busy.id());
        assert_eq!(busy_agg.count, 2);
        assert_eq!(busy_agg.sum.get("viewCount"), Some(&Value::BigInt(40)));
        assert_eq!(busy_agg.max.get("viewCount"), Some(&Value::BigInt(30)));

        let idle_agg = page.docs[1].aggregate("posts").expect("aggregate");
        assert_eq!(idle_agg.count, 0);
        assert_eq!(idle_agg.sum.get("viewCount"), Some(&Value::BigInt(0)));
        assert_eq!(idle_agg.avg.get("viewCount"), Some(&Value::Double(0.0)));
        assert_eq!(idle_agg.max.get("viewCount"), Some(&Value::Null));
        assert!(matches!(
            page.docs[1].related("posts"),
            Some(Related::Aggregate(_))
        ));
    });
}

#[test]
fn user_reads_are_checked_before_io() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async {
        let secrets = Collection::new("secrets")
            .field(FieldDef::text("value"))
            .access(Operation::Read, |args| args.user_id.is_some());
        let engine = Engine::builder()
            .collection(secrets)
            .build()
            .expect("valid collections");
        // Never migrated: a query would fail with a query error.
        let conn = MemoryConnection::new();
        let api = engine.collection("secrets").expect("secrets");

        let anonymous = Context::new(&cx, &conn);
        assert!(matches!(
            api.find(&anonymous, &FindOptions::new()).await,
            Outcome::Err(Error::AccessDenied(_))
        ));
        let system = Context::new(&cx, &conn).with_access(AccessMode::System);
        assert!(matches!(
            api.find(&system, &FindOptions::new()).await,
            Outcome::Err(Error::Query(_))
        ));
    });
}

fn library() -> Engine {
    let authors = Collection::new("authors")
        .field(FieldDef::text("name").required())
        .relation("posts", Relation::has_many("posts", "authorId"));
    let posts = Collection::new("posts")
        .field(FieldDef::text("title").required())
        .field(FieldDef::integer("viewCount").default_value(0))
        .field(FieldDef::text("authorId"))
        .relation("author", Relation::belongs_to("authors", "authorId"))
        .relation("comments", Relation::has_many("comments", "postId"));
    let comments = Collection::new("comments")
        .field(FieldDef::text("body").required())
        .field(FieldDef::text("postId"))
        .field(FieldDef::text("targetType"))
        .field(FieldDef::text("targetId"))
        .relation("post", Relation::belongs_to("posts", "postId"))
        .relation(
            "target",
            Relation::polymorphic(
                "targetType",
                "targetId",
                [("post", "posts"), ("author", "authors")],
            ),
        );
    Engine::builder()
        .collections([authors, posts, comments])
        .build()
        .expect("valid collections")
}

/// Ada writes a1..a4, Bo writes b1 and o1 has no author. c1 sits on a4 and
/// targets it, c2 sits on b1 and targets Ada, c3 targets an unknown type and
/// c4 references nothing.
async fn seed_library(engine: &Engine, ctx: &Context<'_, MemoryConnection>) {
    let authors = engine.collection("authors").expect("authors");
    let posts = engine.collection("posts").expect("posts");
    let comments = engine.collection("comments").expect("comments");

    let mut author_ids = Vec::new();
    for name in ["Ada", "Bo"] {
        let author = unwrap_outcome(authors.create(ctx, Data::new().set("name", name)).await);
        author_ids.push(author.id().expect("id").to_string());
    }
    let seed = [
        ("a1", 1, Some(0)),
        ("a2", 2, Some(0)),
        ("a3", 3, Some(0)),
        ("a4", 4, Some(0)),
        ("b1", 1, Some(1)),
        ("o1", 9, None),
    ];
    let mut post_ids = Vec::new();
    for (title, views, author) in seed {
        let mut data = Data::new().set("title", title).set("viewCount", views);
        if let Some(author) = author {
            data = data.set("authorId", author_ids[author].as_str());
        }
        let post = unwrap_outcome(posts.create(ctx, data).await);
        post_ids.push(post.id().expect("id").to_string());
    }

    let notes = [
        Data::new()
            .set("body", "c1")
            .set("postId", post_ids[3].as_str())
            .set("targetType", "post")
            .set("targetId", post_ids[3].as_str()),
        Data::new()
            .set("body", "c2")
            .set("postId", post_ids[4].as_str())
            .set("targetType", "author")
            .set("targetId", author_ids[0].as_str()),
        Data::new()
            .set("body", "c3")
            .set("targetType", "video")
            .set("targetId", "v1"),
        Data::new().set("body", "c4"),
    ];
    for data in notes {
        unwrap_outcome(comments.create(ctx, data).await);
    }
}

async fn count(
    api: &CollectionApi<'_>,
    ctx: &Context<'_, MemoryConnection>,
    filter: Where,
) -> u64 {
    unwrap_outcome(api.count(ctx, &CountOptions::new().filter(filter)).await)
}

fn titles_of(records: &[Record]) -> Vec<&str> {
    records.iter().filter_map(|r| r.get_str("title")).collect()
}

#[test]
fn has_many_window_slices_each_parent() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async {
        let conn = MemoryConnection::new();
        let engine = library();
        let ctx = Context::system(&cx, &conn);
        unwrap_outcome(engine.migrate(&ctx).await);
        seed_library(&engine, &ctx).await;
        let authors = engine.collection("authors").expect("authors");

        let by_views = || RelationQuery::new().order_by(OrderBy::desc("viewCount"));
        let page = unwrap_outcome(
            authors
                .find(
                    &ctx,
                    &FindOptions::new()
                        .order_by(OrderBy::asc("name"))
                        .with("posts", by_views().limit(2).offset(1)),
                )
                .await,
        );
        assert_eq!(titles_of(page.docs[0].many("posts")), vec!["a3", "a2"]);
        assert!(page.docs[1].many("posts").is_empty());

        let page = unwrap_outcome(
            authors
                .find(
                    &ctx,
                    &FindOptions::new()
                        .order_by(OrderBy::asc("name"))
                        .with("posts", by_views().limit(3)),
                )
                .await,
        );
        assert_eq!(titles_of(page.docs[0].many("posts")), vec!["a4", "a3", "a2"]);
        assert_eq!(titles_of(page.docs[1].many("posts")), vec!["b1"]);
    });
}

#[test]
fn nested_with_loads_each_level_in_one_query() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async {
        let conn = MemoryConnection::new();
        let engine = library();
        let ctx = Context::system(&cx, &conn);
        unwrap_outcome(engine.migrate(&ctx).await);
        seed_library(&engine, &ctx).await;
        let authors = engine.collection("authors").expect("authors");

        let post_with_author = RelationQuery::new().with("author", RelationQuery::new());
        let tree = RelationQuery::new()
            .order_by(OrderBy::asc("title"))
            .with("comments", RelationQuery::new().with("post", post_with_author));
        let before = unwrap_outcome(conn.query_count(&cx).await);
        let page = unwrap_outcome(
            authors
                .find(
                    &ctx,
                    &FindOptions::new()
                        .order_by(OrderBy::asc("name"))
                        .with("posts", tree),
                )
                .await,
        );
        let after = unwrap_outcome(conn.query_count(&cx).await);
        // Count, records, then posts, comments, post and author.
        assert_eq!(after - before, 6);

        let ada = &page.docs[0];
        assert_eq!(titles_of(ada.many("posts")), vec!["a1", "a2", "a3", "a4"]);
        let a4 = &ada.many("posts")[3];
        let c1 = &a4.many("comments")[0];
        assert_eq!(c1.get_str("body"), Some("c1"));
        let post = c1.one("post").expect("post loaded");
        assert_eq!(post.get_str("title"), Some("a4"));
        assert_eq!(
            post.one("author").and_then(|a| a.get_str("name")),
            Some("Ada")
        );
        assert!(ada.many("posts")[0].many("comments").is_empty());

        let bo = &page.docs[1];
        let c2 = &bo.many("posts")[0].many("comments")[0];
        assert_eq!(
            c2.one("post")
                .and_then(|p| p.one("author"))
                .and_then(|a| a.get_str("name")),
            Some("Bo")
        );
    });
}

#[test]
fn polymorphic_and_missing_keys_load_as_null() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async {
        let conn = MemoryConnection::new();
        let engine = library();
        let ctx = Context::system(&cx, &conn);
        unwrap_outcome(engine.migrate(&ctx).await);
        seed_library(&engine, &ctx).await;
        let comments = engine.collection("comments").expect("comments");

        let before = unwrap_outcome(conn.query_count(&cx).await);
        let page = unwrap_outcome(
            comments
                .find(
                    &ctx,
                    &FindOptions::new()
                        .order_by(OrderBy::asc("body"))
                        .with("post", RelationQuery::new())
                        .with("target", RelationQuery::new()),
                )
                .await,
        );
        let after = unwrap_outcome(conn.query_count(&cx).await);
        // Count, records, post, then one query per target type present.
        assert_eq!(after - before, 5);

        let docs = &page.docs;
        assert_eq!(docs.len(), 4);
        assert_eq!(docs[0].one("post").and_then(|p| p.get_str("title")), Some("a4"));
        assert_eq!(docs[0].one("target").and_then(|t| t.get_str("title")), Some("a4"));
        assert_eq!(docs[1].one("target").and_then(|t| t.get_str("name")), Some("Ada"));
        for loaded in &docs[2..] {
            assert!(matches!(loaded.related("post"), Some(Related::One(None))));
            assert!(matches!(loaded.related("target"), Some(Related::One(None))));
        }
    });
}

#[test]
fn column_selection_hides_relation_keys() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async {
        let conn = MemoryConnection::new();
        let engine = library();
        let ctx = Context::system(&cx, &conn);
        unwrap_outcome(engine.migrate(&ctx).await);
        seed_library(&engine, &ctx).await;
        let posts = engine.collection("posts").expect("posts");

        let titles_only = RelationQuery::new().columns(ColumnSelection::new().include("title"));
        let included = unwrap_outcome(
            posts
                .find_one(
                    &ctx,
                    &FindOptions::new()
                        .filter(Where::eq("title", "a1"))
                        .columns(ColumnSelection::new().include("title"))
                        .with(
                            "author",
                            RelationQuery::new()
                                .columns(ColumnSelection::new().include("name"))
                                .with("posts", titles_only),
                        ),
                )
                .await,
        )
        .expect("a1");
        assert!(included.id().is_some());
        assert_eq!(included.get_str("title"), Some("a1"));
        assert!(included.get("authorId").is_none());
        assert!(included.get("viewCount").is_none());
        let author = included.one("author").expect("author loaded");
        assert_eq!(author.get_str("name"), Some("Ada"));
        assert!(author.id().is_some());
        assert!(author.get("createdAt").is_none());
        let written = author.many("posts");
        assert_eq!(written.len(), 4);
        assert!(written.iter().all(|p| p.get("authorId").is_none()));

        let omitted = unwrap_outcome(
            posts
                .find_one(
                    &ctx,
                    &FindOptions::new()
                        .filter(Where::eq("title", "b1"))
                        .columns(ColumnSelection::new().omit("authorId"))
                        .with("author", RelationQuery::new()),
                )
                .await,
        )
        .expect("b1");
        assert!(omitted.get("authorId").is_none());
        assert_eq!(omitted.get_i64("viewCount"), Some(1));
        assert_eq!(
            omitted.one("author").and_then(|a| a.get_str("name")),
            Some("Bo")
        );
    });
}

#[test]
fn to_one_is_and_is_not_cover_missing_parents() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(async {
        let conn = MemoryConnection::new();
        let engine = library();
        let ctx = Context::system(&cx, &conn);
        unwrap_outcome(engine.migrate(&ctx).await);
        seed_library(&engine, &ctx).await;
        let posts = engine.collection("posts").expect("posts");

        let by_ada = || Where::eq("name", "Ada");
        let nobody = || Where::eq("name", "Nobody");
        assert_eq!(count(&posts, &ctx, Where::is("author", by_ada())).await, 4);
        assert_eq!(count(&posts, &ctx, Where::is_not("author", by_ada())).await, 2);
        assert_eq!(count(&posts, &ctx, Where::is("author", nobody())).await, 0);
        assert_eq!(count(&posts, &ctx, Where::is_not("author", nobody())).await, 6);

        let orphans = unwrap_outcome(
            posts
                .find(
                    &ctx,
                    &FindOptions::new()
                        .filter(Where::and(vec![
                            Where::is_not("author", Where::eq("name", "Bo")),
                            Where::field("viewCount", FieldOp::Gt(Value::from(4))),
                        ]))
                        .order_by(OrderBy::asc("title")),
                )
                .await,
        );
        assert_eq!(titles_of(&orphans.docs), vec!["o1"]);
    });
}
