//! Shared tag-table bookkeeping for the four tagged datasets (posts,
//! bookmarks, discussions, media; spec.md 3 "Tag and Record<->Tag").

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::error::Result;
use crate::store::pool::AsyncSqliteConnection;
use crate::store::schema::tags;

#[derive(Insertable)]
#[diesel(table_name = tags)]
struct NewTagRow<'a> {
    name: &'a str,
}

/// Resolve each tag name to its row id, inserting missing tags with
/// `ON CONFLICT IGNORE` (spec.md 4.3.1). A tag row is never deleted here —
/// orphans are tolerated per spec.md 3 invariant 5.
pub async fn resolve_tag_ids(conn: &mut AsyncSqliteConnection, names: &[String]) -> Result<Vec<i32>> {
    use tags::dsl;

    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        diesel::insert_into(dsl::tags)
            .values(NewTagRow { name })
            .on_conflict(dsl::name)
            .do_nothing()
            .execute(conn)
            .await?;
        let id: i32 = dsl::tags
            .filter(dsl::name.eq(name))
            .select(dsl::id)
            .first(conn)
            .await?;
        ids.push(id);
    }
    Ok(ids)
}
