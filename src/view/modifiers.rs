use super::query_results::QueryResults;
use super::{View, ViewContext, ViewParameters, ViewQuery};
use std::sync::Arc;

/// A deferred change to a view, computed off the current view and applied
/// later to whichever view is current then.
#[derive(Debug, Clone)]
pub enum ViewModifier {
    SetQuery(Option<Arc<ViewQuery>>),
    SetQueryResults(Option<Arc<QueryResults>>),
    MergeContext(ViewContext),
    RemoveContextProperty(String),
}

impl ViewModifier {
    pub fn apply(&self, view: View) -> View {
        match self {
            ViewModifier::SetQuery(query) => view.evolve(ViewParameters {
                query: Some(query.clone()),
                ..Default::default()
            }),
            ViewModifier::SetQueryResults(results) => view.evolve(ViewParameters {
                query_results: Some(results.clone()),
                ..Default::default()
            }),
            ViewModifier::MergeContext(context) => view.merge_in_context(context.clone()),
            ViewModifier::RemoveContextProperty(key) => {
                let mut context = view.context.clone();
                context.remove(key);
                view.evolve(ViewParameters {
                    context: Some(context),
                    ..Default::default()
                })
            }
        }
    }
}

/// Apply modifiers in order
pub fn apply_modifiers(view: View, modifiers: &[ViewModifier]) -> View {
    modifiers.iter().fold(view, |view, modifier| modifier.apply(view))
}
