use super::{required_value, Directive};
use crate::context::Context;
use crate::dom::NodeId;
use crate::error::CompileResult;
use crate::plan::is_prefixed;
use crate::traverse::{compile_children, compile_node};
use crate::wrap::NodeWrap;
use futures::FutureExt;
use sprig_common::{package_name_from_url, MountOptions, Package, ServiceError, ServiceResult};
use sprig_reactive::{Scope, Value};
use std::rc::Rc;
use tracing::{debug, warn};

/// Package name and mount options taken from the element's plain attributes
fn mount_request(ctx: &Context, node: NodeId, url: &str) -> (String, MountOptions) {
    let attributes: Vec<(String, String)> = ctx
        .document
        .attributes(node)
        .into_iter()
        .filter(|(name, _)| !is_prefixed(name))
        .collect();
    let name = attributes
        .iter()
        .find(|(key, _)| key == "name")
        .map(|(_, value)| value.clone())
        .unwrap_or_else(|| package_name_from_url(url));
    (name, MountOptions { attributes })
}

/// Child scope exposing the package's data as `$data`
fn data_scope(ctx: &Context, parent: &Scope, package: &dyn Package) -> Scope {
    let data = package.data().unwrap_or(Value::Null);
    // `$` keys are not tracked, so the data gets its own observed root
    let root = ctx.reactor.unique_root("data");
    ctx.reactor.observe(&data, &root);
    parent.child([("$data".to_string(), data)])
}

/// `:data="url"`: children compile once the package is ready
pub(super) fn compile_data(ctx: &Rc<Context>, node: NodeId, wrap: &Rc<NodeWrap>, value: &str) -> CompileResult<()> {
    let url = required_value(ctx, node, Directive::Data, value)?.to_string();
    let (name, options) = mount_request(ctx, node, &url);
    wrap.update(|o| o.skip = true);

    let mounting = ctx.services.packages.mount(&name, &url, options);
    let this = ctx.weak();
    let pending = Rc::downgrade(wrap);
    let resource = async move {
        let package = mounting.await?;
        package.ready().await?;
        let (Some(ctx), Some(wrap)) = (this.upgrade(), pending.upgrade()) else {
            return Ok(());
        };
        debug!(package = %name, "data package ready");

        let scope = data_scope(&ctx, &wrap.scope(), package.as_ref());
        wrap.set_scope(scope.clone());
        wrap.update(|o| o.skip = false);
        let once = wrap.options().once;
        compile_node(&ctx, node, &scope, once, Some(Directive::Data))
            .map_err(|err| ServiceError::package(&name, err.to_string()))
    };
    ctx.add_resource(resource.boxed_local());
    Ok(())
}

/// `:mount="url"`: the package's template replaces the node's children once
/// it is ready
pub(super) fn compile_mount(ctx: &Rc<Context>, node: NodeId, wrap: &Rc<NodeWrap>, value: &str) -> CompileResult<()> {
    let url = required_value(ctx, node, Directive::Mount, value)?.to_string();
    let (name, options) = mount_request(ctx, node, &url);

    let mounting = ctx.services.packages.mount(&name, &url, options);
    let this = ctx.weak();
    let pending = Rc::downgrade(wrap);
    let resource = async move {
        let package = mounting.await?;
        package.ready().await?;
        let (Some(ctx), Some(wrap)) = (this.upgrade(), pending.upgrade()) else {
            return Ok(());
        };
        debug!(package = %name, "package mounted");
        render_package(&ctx, node, &wrap, &name, package.as_ref())
    };
    ctx.add_resource(resource.boxed_local());
    Ok(())
}

fn render_package(
    ctx: &Rc<Context>,
    node: NodeId,
    wrap: &NodeWrap,
    name: &str,
    package: &dyn Package,
) -> ServiceResult<()> {
    let Some(template) = package.template() else {
        return Ok(());
    };
    for child in ctx.document.children(node) {
        ctx.discard(child);
    }
    ctx.document
        .set_inner_html(node, &template)
        .map_err(|err| ServiceError::package(name, err.to_string()))?;

    let scope = match package.data() {
        Some(_) => data_scope(ctx, &wrap.scope(), package),
        None => wrap.scope(),
    };
    let once = wrap.options().once;
    compile_children(ctx, node, &scope, once, false).map_err(|err| {
        warn!(package = %name, error = %err, "package template failed to compile");
        ServiceError::package(name, err.to_string())
    })
}
