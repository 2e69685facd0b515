use std::sync::Arc;

use cadenza_focus::{
    FocusArbiter, FocusChange, FocusChangeListener, FocusRequest, StreamInfo, StreamPolicy,
};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Request { id: u32, policy: StreamPolicy, transient: bool },
    Abandon { id: u32 },
}

fn op() -> impl Strategy<Value = Op> {
    let policy = prop::sample::select(StreamPolicy::VALID.to_vec())
        .prop_filter("player list only", |p| *p != StreamPolicy::VoiceRecord);
    prop_oneof![
        (1u32..8, policy, any::<bool>())
            .prop_map(|(id, policy, transient)| Op::Request { id, policy, transient }),
        (1u32..8).prop_map(|id| Op::Abandon { id }),
    ]
}

fn request(id: u32, policy: StreamPolicy, listener: &Arc<dyn FocusChangeListener>) -> FocusRequest {
    FocusRequest::builder()
        .stream_info(StreamInfo::new(id, policy))
        .listener(Arc::clone(listener))
        .build()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn head_is_always_highest_priority(ops in prop::collection::vec(op(), 1..40)) {
        let arbiter = FocusArbiter::new().unwrap();
        let listener: Arc<dyn FocusChangeListener> = Arc::new(|_: FocusChange| {});
        let mut queued: Vec<(u32, StreamPolicy)> = Vec::new();

        for op in ops {
            match op {
                Op::Request { id, policy, transient } => {
                    let req = request(id, policy, &listener);
                    if transient {
                        arbiter.request_focus_transient(&req).unwrap();
                    } else {
                        arbiter.request_focus(&req).unwrap();
                    }
                    queued.retain(|(q, _)| *q != id);
                    queued.push((id, policy));
                }
                Op::Abandon { id } => {
                    arbiter.abandon_focus(&request(id, StreamPolicy::Media, &listener));
                    queued.retain(|(q, _)| *q != id);
                }
            }

            let head = arbiter.current_player_stream_info();
            match queued.iter().map(|(_, p)| p.priority()).max() {
                None => prop_assert!(head.is_none()),
                Some(best) => {
                    let head = head.expect("queued requests imply an owner");
                    prop_assert_eq!(head.policy.priority(), best);
                    prop_assert!(queued.iter().any(|(q, _)| *q == head.id.0));
                }
            }
        }
    }
}
