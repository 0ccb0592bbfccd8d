//! Property tests for the replay pool

use proptest::prelude::*;
use rand::{rngs::StdRng, SeedableRng};
use trajectory_rl::buffer::ReplayBuffer;

proptest! {
    /// Size is always min(insertions, capacity)
    #[test]
    fn test_size_is_min_of_insertions_and_capacity(
        capacity in 1usize..32,
        insertions in 0usize..100,
    ) {
        let mut buffer = ReplayBuffer::new(capacity, 2, 1).unwrap();
        for i in 0..insertions {
            buffer.add(&[i as f32, 0.0], &[0.0], 0.0, false);
            prop_assert!(buffer.len() <= capacity);
        }
        prop_assert_eq!(buffer.len(), insertions.min(capacity));
        prop_assert_eq!(buffer.iter().count(), insertions.min(capacity));
    }

    /// A successor is never the stale slot past the newest transition
    #[test]
    fn test_sampled_successors_follow_their_transition(
        capacity in 3usize..20,
        extra in 0usize..40,
        seed in any::<u64>(),
    ) {
        let mut buffer = ReplayBuffer::new(capacity, 1, 1).unwrap();
        let insertions = capacity + extra;
        for i in 0..insertions {
            buffer.add(&[i as f32], &[0.0], 0.0, false);
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let batch = buffer.sample_batch(capacity - 1, &mut rng).unwrap();
        for (obs, next) in batch.observations.iter().zip(&batch.next_observations) {
            prop_assert_eq!(next[0], obs[0] + 1.0);
        }
    }
}
