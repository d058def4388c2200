//! Diesel ORM models paired with the tables in [`super::schema`].

use diesel::prelude::*;

use super::schema;

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::crawl_sources)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CrawlSourceRecord {
    pub id: i32,
    pub origin: String,
    pub dns_name_id: Option<i32>,
    pub global_reset_required: bool,
    pub created_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::crawl_sources)]
pub struct NewCrawlSource<'a> {
    pub origin: &'a str,
    pub dns_name_id: Option<i32>,
    pub global_reset_required: bool,
    pub created_at: &'a str,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::crawl_source_meta)]
#[diesel(primary_key(source_id, dataset))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CrawlSourceMetaRecord {
    pub source_id: i32,
    pub dataset: String,
    pub crawl_source_version: i64,
    pub crawl_dataset_version: i32,
    pub updated_at: String,
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = schema::crawl_source_meta)]
pub struct NewCrawlSourceMeta<'a> {
    pub source_id: i32,
    pub dataset: &'a str,
    pub crawl_source_version: i64,
    pub crawl_dataset_version: i32,
    pub updated_at: &'a str,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::tags)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TagRecord {
    pub id: i32,
    pub name: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::tags)]
pub struct NewTag<'a> {
    pub name: &'a str,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::posts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PostRecord {
    pub id: i32,
    pub source_id: i32,
    pub pathname: String,
    pub body: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub crawled_at: i64,
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = schema::posts)]
pub struct NewPost<'a> {
    pub source_id: i32,
    pub pathname: &'a str,
    pub body: &'a str,
    pub created_at: i64,
    pub updated_at: i64,
    pub crawled_at: i64,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::bookmarks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BookmarkRecord {
    pub id: i32,
    pub source_id: i32,
    pub pathname: String,
    pub href: String,
    pub title: String,
    pub description: String,
    pub pinned: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub crawled_at: i64,
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = schema::bookmarks)]
pub struct NewBookmark<'a> {
    pub source_id: i32,
    pub pathname: &'a str,
    pub href: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub pinned: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub crawled_at: i64,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::discussions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DiscussionRecord {
    pub id: i32,
    pub source_id: i32,
    pub pathname: String,
    pub title: String,
    pub body: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub crawled_at: i64,
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = schema::discussions)]
pub struct NewDiscussion<'a> {
    pub source_id: i32,
    pub pathname: &'a str,
    pub title: &'a str,
    pub body: &'a str,
    pub created_at: i64,
    pub updated_at: i64,
    pub crawled_at: i64,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::comments)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CommentRecord {
    pub id: i32,
    pub source_id: i32,
    pub pathname: String,
    pub body: String,
    pub parent_href: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub crawled_at: i64,
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = schema::comments)]
pub struct NewComment<'a> {
    pub source_id: i32,
    pub pathname: &'a str,
    pub body: &'a str,
    pub parent_href: &'a str,
    pub created_at: i64,
    pub updated_at: i64,
    pub crawled_at: i64,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::media)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MediaRecord {
    pub id: i32,
    pub source_id: i32,
    pub pathname: String,
    pub href: String,
    pub mime_type: String,
    pub title: String,
    pub description: String,
    pub created_at: i64,
    pub crawled_at: i64,
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = schema::media)]
pub struct NewMedia<'a> {
    pub source_id: i32,
    pub pathname: &'a str,
    pub href: &'a str,
    pub mime_type: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub created_at: i64,
    pub crawled_at: i64,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::votes)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct VoteRecord {
    pub id: i32,
    pub source_id: i32,
    pub pathname: String,
    pub subject: String,
    pub vote: i32,
    pub created_at: i64,
    pub crawled_at: i64,
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = schema::votes)]
pub struct NewVote<'a> {
    pub source_id: i32,
    pub pathname: &'a str,
    pub subject: &'a str,
    pub vote: i32,
    pub created_at: i64,
    pub crawled_at: i64,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::reactions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ReactionRecord {
    pub id: i32,
    pub source_id: i32,
    pub pathname: String,
    pub topic: String,
    pub emojis: String,
    pub crawled_at: i64,
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = schema::reactions)]
pub struct NewReaction<'a> {
    pub source_id: i32,
    pub pathname: &'a str,
    pub topic: &'a str,
    pub emojis: &'a str,
    pub crawled_at: i64,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::follow_edges)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct FollowEdgeRecord {
    pub id: i32,
    pub source_id: i32,
    pub dest: String,
    pub crawled_at: i64,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::follow_edges)]
pub struct NewFollowEdge<'a> {
    pub source_id: i32,
    pub dest: &'a str,
    pub crawled_at: i64,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::published_site_edges)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PublishedSiteEdgeRecord {
    pub id: i32,
    pub source_id: i32,
    pub pathname: String,
    pub dest: String,
    pub crawled_at: i64,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::published_site_edges)]
pub struct NewPublishedSiteEdge<'a> {
    pub source_id: i32,
    pub pathname: &'a str,
    pub dest: &'a str,
    pub crawled_at: i64,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::site_descriptions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SiteDescriptionRecord {
    pub id: i32,
    pub source_id: i32,
    pub subject_url: String,
    pub title: String,
    pub description: String,
    pub site_type: String,
    pub created_at: i64,
    pub crawled_at: i64,
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = schema::site_descriptions)]
pub struct NewSiteDescription<'a> {
    pub source_id: i32,
    pub subject_url: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub site_type: &'a str,
    pub created_at: i64,
    pub crawled_at: i64,
}

/// A DNS binding (spec.md 3, "DNS Binding"; 6.1 `DNSStore`). At most one row
/// per `name` has `is_current = true` (`idx_dns_bindings_current`).
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::dns_bindings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DnsBindingRecord {
    pub id: i32,
    pub name: String,
    pub key: String,
    pub is_current: bool,
    pub first_confirmed_at: String,
    pub last_confirmed_at: String,
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = schema::dns_bindings)]
pub struct NewDnsBinding<'a> {
    pub name: &'a str,
    pub key: &'a str,
    pub is_current: bool,
    pub first_confirmed_at: &'a str,
    pub last_confirmed_at: &'a str,
}
