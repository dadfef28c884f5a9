use super::{HandlerInterceptor, InterceptorMapping, RequestPredicate};
use crate::context::RequestContext;
use crate::method::HandlerMethod;
use std::collections::HashMap;
use std::sync::Arc;

struct Entry {
    interceptor: Arc<dyn HandlerInterceptor>,
    predicate: Option<Arc<dyn RequestPredicate>>,
    /// Memo slot for predicates shared by a complex group.
    group: Option<usize>,
}

/// The interceptors eligible for one handler method, sorted once at
/// registration.
pub struct InterceptorMatcher {
    entries: Vec<Entry>,
    complex_groups: usize,
}

fn predicate_key(predicate: &Arc<dyn RequestPredicate>) -> *const () {
    Arc::as_ptr(predicate) as *const ()
}

impl InterceptorMatcher {
    /// Filters `mappings` by handler eligibility and stable-sorts them by order.
    ///
    /// Mappings sharing a predicate form a complex group when there is more
    /// than one of them and their combined cost exceeds `threshold`; such a
    /// predicate is evaluated once per request.
    pub fn new(handler: &HandlerMethod, mappings: &[InterceptorMapping], threshold: usize) -> Self {
        let mut eligible: Vec<&InterceptorMapping> = mappings.iter().filter(|m| m.is_eligible(handler)).collect();
        eligible.sort_by_key(|m| m.get_order());

        let mut shared: HashMap<*const (), (usize, usize)> = HashMap::new();
        for predicate in eligible.iter().filter_map(|m| m.predicate()) {
            let slot = shared.entry(predicate_key(predicate)).or_insert((0, 0));
            slot.0 += 1;
            slot.1 += predicate.cost();
        }

        let mut groups: HashMap<*const (), usize> = HashMap::new();
        let entries = eligible
            .into_iter()
            .map(|mapping| {
                let group = mapping.predicate().and_then(|predicate| {
                    let key = predicate_key(predicate);
                    let (members, cost) = shared.get(&key).copied().unwrap_or_default();
                    if members > 1 && cost > threshold {
                        let next = groups.len();
                        Some(*groups.entry(key).or_insert(next))
                    } else {
                        None
                    }
                });
                Entry {
                    interceptor: Arc::clone(mapping.interceptor()),
                    predicate: mapping.predicate().cloned(),
                    group,
                }
            })
            .collect();

        Self {
            entries,
            complex_groups: groups.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of predicate groups whose result is shared per request.
    pub fn complex_groups(&self) -> usize {
        self.complex_groups
    }

    /// The interceptors applying to this request, in registration order.
    ///
    /// `None` when no interceptor is registered at all, so callers can skip
    /// the interceptor machinery entirely.
    pub fn matching(&self, ctx: &RequestContext) -> Option<Vec<Arc<dyn HandlerInterceptor>>> {
        if self.entries.is_empty() {
            return None;
        }

        // Scratch memo for complex groups; dropped with this call.
        let mut memo: Vec<Option<bool>> = vec![None; self.complex_groups];
        let matched = self
            .entries
            .iter()
            .filter(|entry| match (&entry.predicate, entry.group) {
                (None, _) => true,
                (Some(predicate), Some(group)) => *memo[group].get_or_insert_with(|| predicate.matches(ctx)),
                (Some(predicate), None) => predicate.matches(ctx),
            })
            .map(|entry| Arc::clone(&entry.interceptor))
            .collect();
        Some(matched)
    }
}
