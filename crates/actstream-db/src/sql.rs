//! Converts validated [`actstream_templates::Param`]s into
//! `tokio-postgres` bind values. This is the only place in the workspace
//! that hands parameters to the wire protocol.

use tokio_postgres::types::ToSql;

use actstream_templates::Param;

/// Boxes each [`Param`] as an owned `ToSql` value so the caller can borrow
/// a `&[&(dyn ToSql + Sync)]` slice from it for the duration of a query.
#[must_use]
pub fn bind(params: &[Param]) -> Vec<Box<dyn ToSql + Sync + Send>> {
    params
        .iter()
        .map(|param| -> Box<dyn ToSql + Sync + Send> {
            match param {
                Param::Str(s) => Box::new(s.clone()),
                Param::I64(n) => Box::new(*n),
                Param::F64(f) => Box::new(*f),
                Param::Bool(b) => Box::new(*b),
                Param::Uuid(u) => Box::new(*u),
                Param::Timestamp(ts) => Box::new(*ts),
                Param::Json(v) => Box::new(v.clone()),
                Param::Null => Box::new(Option::<String>::None),
            }
        })
        .collect()
}

/// Borrows a bind-ready slice from the owned boxes produced by [`bind`].
#[must_use]
pub fn as_refs(bound: &[Box<dyn ToSql + Sync + Send>]) -> Vec<&(dyn ToSql + Sync)> {
    bound.iter().map(|b| b.as_ref() as &(dyn ToSql + Sync)).collect()
}
