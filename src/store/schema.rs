//! Diesel table definitions for the index store.
//!
//! Hand-maintained rather than `diesel print-schema`-generated, since the
//! schema is built incrementally by `store::migrations` rather than by a
//! single `diesel migration run`.

diesel::table! {
    crawl_sources (id) {
        id -> Integer,
        origin -> Text,
        dns_name_id -> Nullable<Integer>,
        global_reset_required -> Bool,
        created_at -> Text,
    }
}

diesel::table! {
    crawl_source_meta (source_id, dataset) {
        source_id -> Integer,
        dataset -> Text,
        crawl_source_version -> BigInt,
        crawl_dataset_version -> Integer,
        updated_at -> Text,
    }
}

diesel::table! {
    tags (id) {
        id -> Integer,
        name -> Text,
    }
}

diesel::table! {
    posts (id) {
        id -> Integer,
        source_id -> Integer,
        pathname -> Text,
        body -> Text,
        created_at -> BigInt,
        updated_at -> BigInt,
        crawled_at -> BigInt,
    }
}

diesel::table! {
    post_tags (post_id, tag_id) {
        post_id -> Integer,
        tag_id -> Integer,
    }
}

diesel::table! {
    bookmarks (id) {
        id -> Integer,
        source_id -> Integer,
        pathname -> Text,
        href -> Text,
        title -> Text,
        description -> Text,
        pinned -> Bool,
        created_at -> BigInt,
        updated_at -> BigInt,
        crawled_at -> BigInt,
    }
}

diesel::table! {
    bookmark_tags (bookmark_id, tag_id) {
        bookmark_id -> Integer,
        tag_id -> Integer,
    }
}

diesel::table! {
    discussions (id) {
        id -> Integer,
        source_id -> Integer,
        pathname -> Text,
        title -> Text,
        body -> Text,
        created_at -> BigInt,
        updated_at -> BigInt,
        crawled_at -> BigInt,
    }
}

diesel::table! {
    discussion_tags (discussion_id, tag_id) {
        discussion_id -> Integer,
        tag_id -> Integer,
    }
}

diesel::table! {
    comments (id) {
        id -> Integer,
        source_id -> Integer,
        pathname -> Text,
        body -> Text,
        parent_href -> Text,
        created_at -> BigInt,
        updated_at -> BigInt,
        crawled_at -> BigInt,
    }
}

diesel::table! {
    media (id) {
        id -> Integer,
        source_id -> Integer,
        pathname -> Text,
        href -> Text,
        mime_type -> Text,
        title -> Text,
        description -> Text,
        created_at -> BigInt,
        crawled_at -> BigInt,
    }
}

diesel::table! {
    media_tags (media_id, tag_id) {
        media_id -> Integer,
        tag_id -> Integer,
    }
}

diesel::table! {
    votes (id) {
        id -> Integer,
        source_id -> Integer,
        pathname -> Text,
        subject -> Text,
        vote -> Integer,
        created_at -> BigInt,
        crawled_at -> BigInt,
    }
}

diesel::table! {
    reactions (id) {
        id -> Integer,
        source_id -> Integer,
        pathname -> Text,
        topic -> Text,
        emojis -> Text,
        crawled_at -> BigInt,
    }
}

diesel::table! {
    follow_edges (id) {
        id -> Integer,
        source_id -> Integer,
        dest -> Text,
        crawled_at -> BigInt,
    }
}

diesel::table! {
    published_site_edges (id) {
        id -> Integer,
        source_id -> Integer,
        pathname -> Text,
        dest -> Text,
        crawled_at -> BigInt,
    }
}

diesel::table! {
    site_descriptions (id) {
        id -> Integer,
        source_id -> Integer,
        subject_url -> Text,
        title -> Text,
        description -> Text,
        site_type -> Text,
        created_at -> BigInt,
        crawled_at -> BigInt,
    }
}

diesel::table! {
    dns_bindings (id) {
        id -> Integer,
        name -> Text,
        key -> Text,
        is_current -> Bool,
        first_confirmed_at -> Text,
        last_confirmed_at -> Text,
    }
}

diesel::joinable!(crawl_source_meta -> crawl_sources (source_id));
diesel::joinable!(posts -> crawl_sources (source_id));
diesel::joinable!(bookmarks -> crawl_sources (source_id));
diesel::joinable!(discussions -> crawl_sources (source_id));
diesel::joinable!(comments -> crawl_sources (source_id));
diesel::joinable!(media -> crawl_sources (source_id));
diesel::joinable!(votes -> crawl_sources (source_id));
diesel::joinable!(reactions -> crawl_sources (source_id));
diesel::joinable!(follow_edges -> crawl_sources (source_id));
diesel::joinable!(published_site_edges -> crawl_sources (source_id));
diesel::joinable!(site_descriptions -> crawl_sources (source_id));
diesel::joinable!(post_tags -> posts (post_id));
diesel::joinable!(post_tags -> tags (tag_id));
diesel::joinable!(bookmark_tags -> bookmarks (bookmark_id));
diesel::joinable!(bookmark_tags -> tags (tag_id));
diesel::joinable!(discussion_tags -> discussions (discussion_id));
diesel::joinable!(discussion_tags -> tags (tag_id));
diesel::joinable!(media_tags -> media (media_id));
diesel::joinable!(media_tags -> tags (tag_id));

diesel::allow_tables_to_appear_in_same_query!(
    crawl_sources,
    crawl_source_meta,
    tags,
    posts,
    post_tags,
    bookmarks,
    bookmark_tags,
    discussions,
    discussion_tags,
    comments,
    media,
    media_tags,
    votes,
    reactions,
    follow_edges,
    published_site_edges,
    site_descriptions,
    dns_bindings,
);
