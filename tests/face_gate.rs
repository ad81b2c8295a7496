use facevote::{
    AuthOutcome, Config, EmbeddingExtractor, Frame, LedgerStore, SimilarityMatcher, VoteError,
    VotingBooth, VotingLedger, cosine_similarity,
};
use image::{DynamicImage, Rgba, RgbaImage};
use std::sync::Arc;

/// Deterministic test "face": a diagonal gradient with a seed-dependent pattern.
fn face(seed: u32) -> DynamicImage {
    let image = RgbaImage::from_fn(640, 480, |x, y| {
        let base = (x + y) / 5;
        let v = match seed {
            0 => base,
            1 => (x / 64 % 2) * 200 + 20,
            _ => (x * 7 + y * 13 + seed * 31) % 251,
        };
        let v = (v % 256) as u8;
        Rgba([v, v.wrapping_add(10), v / 2, 255])
    });
    DynamicImage::ImageRgba8(image)
}

#[test]
fn extractor_output_is_unit_length_and_self_similar() {
    let extractor = EmbeddingExtractor::new(&Config::default().embedding);
    for seed in 0..3 {
        let embedding = extractor.extract_image(&face(seed));
        assert_eq!(embedding.len(), 512);

        let norm: f32 = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
        assert!((cosine_similarity(&embedding, &embedding) - 1.0).abs() < 1e-5);
    }
}

#[test]
fn matcher_scenario_with_orthogonal_query() {
    let matcher = SimilarityMatcher::new(0.7);
    let e1 = vec![1.0, 0.0, 0.0];
    let e2 = vec![0.0, 1.0, 0.0];
    let gallery = [("alice", e1.as_slice()), ("bob", e2.as_slice())];

    let found = matcher.best_match(&e1, gallery.iter().copied()).unwrap();
    assert_eq!(found.identity, "alice");

    assert!(matcher.best_match(&[0.0, 0.0, 1.0], gallery.iter().copied()).is_none());
}

#[test]
fn booth_round_trip_through_store() {
    let tmp = tempfile::tempdir().unwrap();
    let store = LedgerStore::new(tmp.path().join("ledger.bincode")).unwrap();
    let config = Config::default();

    {
        let ledger = Arc::new(store.load().unwrap());
        ledger.add_candidate("A", "Party A").unwrap();
        ledger.add_candidate("B", "Party B").unwrap();

        let booth = VotingBooth::from_config(&config, Arc::clone(&ledger));
        booth.enroll("alice", "alice@example.org", &Frame::from_image(&face(0))).unwrap();
        store.save(&ledger).unwrap();
    }

    let ledger = Arc::new(store.load().unwrap());
    let booth = VotingBooth::from_config(&config, Arc::clone(&ledger));

    let session = match booth.authenticate(&Frame::from_image(&face(0))).unwrap() {
        AuthOutcome::Authenticated(session) => session,
        other => panic!("expected alice, got {:?}", other),
    };
    assert_eq!(session.voter_id, "v1");
    assert!((session.similarity - 1.0).abs() < 1e-4);

    booth.cast(&session, "2").unwrap();
    store.save(&ledger).unwrap();

    let reloaded = store.load().unwrap();
    assert!(reloaded.has_voted("v1").unwrap());
    assert!(matches!(reloaded.cast_vote("v1", "1"), Err(VoteError::AlreadyVoted(_))));
}

#[test]
fn empty_gallery_never_authenticates() {
    let booth = VotingBooth::from_config(&Config::default(), Arc::new(VotingLedger::new()));
    let outcome = booth.authenticate(&Frame::from_image(&face(1))).unwrap();
    assert_eq!(outcome, AuthOutcome::NoMatch);
}
