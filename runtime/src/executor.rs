//! Inline effect execution.
//!
//! Request/response services (create a booking, confirm a return) reduce a
//! command against freshly loaded state, persist the result, and then need the
//! outcome of the follow-up effects before answering the caller. They do not
//! keep a long-lived [`Store`](crate::Store); instead they hand the effects to
//! [`run_effects`], which drives the whole effect tree to completion and
//! returns every action it produced, in completion order for parallel
//! branches and in declaration order for sequential ones.

use campus_rental_core::effect::Effect;
use futures::future::{BoxFuture, join_all};

/// Run a single effect to completion, collecting the actions it produces.
pub fn run_effect<A>(effect: Effect<A>) -> BoxFuture<'static, Vec<A>>
where
    A: Send + 'static,
{
    Box::pin(async move {
        match effect {
            Effect::None => Vec::new(),
            Effect::Future(fut) => fut.await.into_iter().collect(),
            Effect::Delay { duration, action } => {
                tokio::time::sleep(duration).await;
                vec![*action]
            },
            Effect::Parallel(effects) => join_all(effects.into_iter().map(run_effect))
                .await
                .into_iter()
                .flatten()
                .collect(),
            Effect::Sequential(effects) => {
                let mut produced = Vec::new();
                for effect in effects {
                    produced.extend(run_effect(effect).await);
                }
                produced
            },
        }
    })
}

/// Run a batch of effects concurrently, collecting the actions they produce.
///
/// Produced actions are returned to the caller, not reduced again.
pub async fn run_effects<A, I>(effects: I) -> Vec<A>
where
    A: Send + 'static,
    I: IntoIterator<Item = Effect<A>>,
{
    let effects: Vec<Effect<A>> = effects.into_iter().collect();
    metrics::counter!("executor.effects.total").increment(effects.len() as u64);
    run_effect(Effect::Parallel(effects)).await
}
