use crate::error::{JResult, TrackmanJniError};
use trackman_rs::activity::TransitionEvent;
use trackman_rs::classifier::TransitionBroadcast;

/// Rebuild a transition broadcast from the flattened arrays the Kotlin
/// receiver hands over.
///
/// `types[i]` and `transitions[i]` describe event `i`. A missing array means
/// the broadcast carried no transition result.
pub fn broadcast_from_arrays(
    action: Option<String>,
    types: Option<Vec<i32>>,
    transitions: Option<Vec<i32>>,
) -> JResult<TransitionBroadcast> {
    let events = match (types, transitions) {
        (Some(types), Some(transitions)) => {
            if types.len() != transitions.len() {
                return Err(TrackmanJniError::InvalidParameters(format!(
                    "{} activity types but {} transition types",
                    types.len(),
                    transitions.len()
                )));
            }
            Some(
                types
                    .into_iter()
                    .zip(transitions)
                    .map(|(activity_type, transition_type)| {
                        TransitionEvent::new(activity_type, transition_type)
                    })
                    .collect(),
            )
        }
        _ => None,
    };

    Ok(TransitionBroadcast { action, events })
}
