//! Ready-made pieces for scoping stages

use crate::core::model::Model;
use crate::core::store::Filter;
use crate::pipeline::views::QueryScopeView;

/// QueryScope stage restricting reads to records whose `field` equals the
/// path parameter `param`
///
/// Meant for routes whose prefix declares the parameter, e.g.
/// `/user/{user_id}` with `scope_by_param("user_id", "user_id")`.
pub fn scope_by_param(
    param: &'static str,
    field: &'static str,
) -> impl Fn(&mut dyn QueryScopeView) -> bool + Send + Sync + 'static {
    move |request: &mut dyn QueryScopeView| {
        let Some(value) = request.param(param).map(str::to_string) else {
            tracing::error!(param, "Route declares no such path parameter");
            return false;
        };

        let scoped = request.store().filter(Filter::eq(field, value));
        request.set_store(scoped);
        true
    }
}

/// Whether `item` offers the ownership capability and belongs to `owner`
pub fn is_owned_by<T: Model>(item: &T, owner: u64) -> bool {
    item.as_owned().and_then(|owned| owned.owner_id()) == Some(owner)
}
