use std::convert::Infallible;
use std::sync::Arc;

/// Rewriting support for persistent trees.
///
/// Sub-trees left untouched by a transformation are shared with the input: a node is only
/// rebuilt when one of its children was replaced.
pub trait TreeNode: Sized {

    fn children(&self) -> Vec<Arc<Self>>;

    /// Creates a copy of this node with the given children.
    fn with_new_children(self: Arc<Self>, children: Vec<Arc<Self>>) -> Arc<Self>;

    /// Applies `transform_fn` to the children first, then to the node itself.
    fn transform_up<F>(self: Arc<Self>, transform_fn: &F) -> Arc<Self>
    where
        F: Fn(Arc<Self>) -> Arc<Self>,
    {
        let result: Result<Arc<Self>, Infallible> = self.try_transform_up(&|node| Ok(transform_fn(node)));
        match result {
            Ok(node) => node,
            Err(never) => match never {},
        }
    }

    /// Like [`transform_up`](TreeNode::transform_up) but stops at the first error, which is
    /// returned as is.
    fn try_transform_up<F, E>(self: Arc<Self>, transform_fn: &F) -> Result<Arc<Self>, E>
    where
        F: Fn(Arc<Self>) -> Result<Arc<Self>, E>,
    {
        let children = self
            .children()
            .into_iter()
            .map(|child| child.try_transform_up(transform_fn))
            .collect::<Result<Vec<_>, E>>()?;
        transform_fn(rebuild(self, children))
    }

    /// Applies `transform_fn` to the node first, then to the children of its result.
    fn transform_down<F>(self: Arc<Self>, transform_fn: &F) -> Arc<Self>
    where
        F: Fn(Arc<Self>) -> Arc<Self>,
    {
        let node = transform_fn(self);
        let children = node
            .children()
            .into_iter()
            .map(|child| child.transform_down(transform_fn))
            .collect();
        rebuild(node, children)
    }
}

/// Returns `node` itself if `children` are the very same nodes it already has.
fn rebuild<T: TreeNode>(node: Arc<T>, children: Vec<Arc<T>>) -> Arc<T> {
    let unchanged = node
        .children()
        .iter()
        .zip(&children)
        .all(|(before, after)| Arc::ptr_eq(before, after));
    if unchanged {
        node
    } else {
        node.with_new_children(children)
    }
}
