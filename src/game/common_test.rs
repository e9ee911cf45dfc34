#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::game::common::{
        choose_move, legal_indices, mask_policy, GameColor, GameOutcome, GamesResults,
    };

    #[test]
    fn outcome_scores() {
        let win = GameOutcome::Win(GameColor::Player2);
        assert_eq!(win.score_for(GameColor::Player2), 1.0);
        assert_eq!(win.score_for(GameColor::Player1), -1.0);
        assert_eq!(GameOutcome::Draw.score_for(GameColor::Player1), 0.0);
        assert_eq!(win.winner(), Some(GameColor::Player2));
        assert_eq!(GameOutcome::Draw.winner(), None);
    }

    #[test]
    fn results_winrate() {
        let mut results = GamesResults::default();
        assert_eq!(results.winrate(GameColor::Player1), 0.0);

        for _ in 0..5 {
            results.record(GameOutcome::Win(GameColor::Player1));
        }
        for _ in 0..3 {
            results.record(GameOutcome::Win(GameColor::Player2));
        }
        for _ in 0..2 {
            results.record(GameOutcome::Draw);
        }
        assert_eq!(results.games_num(), 10);
        assert!((results.winrate(GameColor::Player1) - 0.6).abs() < 1e-6);
        assert!((results.winrate(GameColor::Player2) - 0.4).abs() < 1e-6);
        assert!((results.draw_rate() - 0.2).abs() < 1e-6);
        assert_eq!(results, GamesResults { w1: 5, w2: 3, d: 2 });
    }

    #[test]
    fn policy_masking() {
        let masked = mask_policy(&[0.5, 0.25, 0.25, 0.0], &[false, true, true, true]);
        assert_eq!(masked, vec![0.0, 0.5, 0.5, 0.0]);

        /* no mass on legal moves, uniform fallback */
        let masked = mask_policy(&[1.0, 0.0, 0.0, 0.0], &[false, true, false, true]);
        assert_eq!(masked, vec![0.0, 0.5, 0.0, 0.5]);

        assert_eq!(legal_indices(&[false, true, false, true]), vec![1, 3]);
    }

    #[test]
    fn greedy_and_sampled_moves() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        assert_eq!(choose_move(&[0.1, 0.7, 0.2], 0.0, &mut rng), 1);

        for _ in 0..100 {
            let m = choose_move(&[0.0, 0.5, 0.5, 0.0], 1.0, &mut rng);
            assert!(m == 1 || m == 2);
        }
    }
}
