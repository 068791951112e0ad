use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use ytmusic_dl_bot::bot::actions::{
    apply_action, run_download, run_search, ActionOutcome, DownloadOutcome, SearchOutcome,
};
use ytmusic_dl_bot::bot::views::{track_keyboard, CallbackAction, DefaultBotView};
use ytmusic_dl_bot::providers::{
    AudioDownloader, DownloadError, DownloadedAudio, MusicSearch, SearchError, Track,
};
use ytmusic_dl_bot::session::SessionStore;

fn imagine_results() -> Vec<Track> {
    [
        ("Imagine", "YkgkThdzX-8"),
        ("Imagine (Remastered 2010)", "VOgFZfRVaww"),
        ("Imagine (Ultimate Mix)", "rAn-AWOBRLo"),
        ("Imagine (Live)", "DVg2EJvvlF8"),
        ("Imagine (Demo)", "9i5ey4mqRQA"),
    ]
    .into_iter()
    .map(|(title, id)| Track {
        title: title.to_string(),
        artists: vec!["John Lennon".to_string()],
        album: Some("Imagine".to_string()),
        duration_secs: Some(187),
        thumbnail_url: Some(format!("https://i.ytimg.com/vi/{id}/hqdefault.jpg")),
        video_id: id.to_string(),
    })
    .collect()
}

fn queen_results() -> Vec<Track> {
    vec![Track {
        title: "Bohemian Rhapsody".to_string(),
        artists: vec!["Queen".to_string()],
        album: Some("A Night at the Opera".to_string()),
        duration_secs: Some(355),
        thumbnail_url: None,
        video_id: "fJ9rUzIMcZQ".to_string(),
    }]
}

/// Answers "queen" and "imagine" like the real catalogue would
struct CatalogueSearch;

#[async_trait::async_trait]
impl MusicSearch for CatalogueSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>, SearchError> {
        let results = match query {
            "queen" => queen_results(),
            "imagine" => imagine_results(),
            _ => Vec::new(),
        };
        Ok(results.into_iter().take(limit).collect())
    }
}

/// Returns fixed results and counts calls
struct StubSearch {
    results: Vec<Track>,
    calls: AtomicUsize,
}

impl StubSearch {
    fn new(results: Vec<Track>) -> Self {
        Self {
            results,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl MusicSearch for StubSearch {
    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<Track>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.results.iter().take(limit).cloned().collect())
    }
}

struct FailingSearch;

#[async_trait::async_trait]
impl MusicSearch for FailingSearch {
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<Track>, SearchError> {
        Err(SearchError::Network("connection reset".to_string()))
    }
}

/// Validates the id like the real downloader, then pretends to succeed
struct StubDownloader;

#[async_trait::async_trait]
impl AudioDownloader for StubDownloader {
    async fn download(&self, track: &Track) -> Result<DownloadedAudio, DownloadError> {
        if !track.has_valid_id() {
            return Err(DownloadError::InvalidId(track.video_id.clone()));
        }
        Ok(DownloadedAudio {
            path: PathBuf::from(format!("/tmp/{}.mp3", track.video_id)),
            file_name: format!("{}.mp3", track.title),
            title: track.title.clone(),
            performer: track.artist_line(),
            size_bytes: 4_200_000,
        })
    }
}

#[tokio::test]
async fn test_imagine_browse_to_last_and_stay() {
    let store: SessionStore<u64> = SessionStore::new();
    let search = StubSearch::new(imagine_results());

    let SearchOutcome::Results(session) = run_search(&store, &search, 42, "imagine", 5).await
    else {
        panic!("expected results");
    };
    assert!(session.len() <= 5);
    assert_eq!(session.index(), 0);

    let sid = session.id();
    let mut last = session;
    for _ in 0..4 {
        match apply_action(&store, &42, CallbackAction::Next(sid)).await {
            ActionOutcome::Render(s) => last = s,
            other => panic!("expected render, got {other:?}"),
        }
    }
    assert_eq!(last.index(), 4);

    assert_eq!(
        apply_action(&store, &42, CallbackAction::Next(sid)).await,
        ActionOutcome::Unchanged
    );
    assert_eq!(store.get(&42).await.map(|s| s.index()), Some(4));
}

#[tokio::test]
async fn test_search_respects_limit() {
    let store: SessionStore<u64> = SessionStore::new();
    let search = StubSearch::new(imagine_results());

    let SearchOutcome::Results(session) = run_search(&store, &search, 1, "imagine", 2).await
    else {
        panic!("expected results");
    };
    assert_eq!(session.len(), 2);
}

#[tokio::test]
async fn test_zero_results_never_show_navigation() {
    let store: SessionStore<u64> = SessionStore::new();
    let search = StubSearch::new(Vec::new());

    assert_eq!(
        run_search(&store, &search, 7, "zzzzqqqq", 5).await,
        SearchOutcome::NoResults
    );
    assert!(store.get(&7).await.is_none());

    // Stale buttons from an older message find nothing to navigate
    assert_eq!(
        apply_action(&store, &7, CallbackAction::Next(uuid::Uuid::new_v4())).await,
        ActionOutcome::Expired
    );
}

#[tokio::test]
async fn test_search_failure_is_reported_as_no_results() {
    let store: SessionStore<u64> = SessionStore::new();
    assert_eq!(
        run_search(&store, &FailingSearch, 3, "imagine", 5).await,
        SearchOutcome::NoResults
    );
}

#[tokio::test]
async fn test_blank_query_does_not_call_search() {
    let store: SessionStore<u64> = SessionStore::new();
    let search = StubSearch::new(imagine_results());

    assert_eq!(
        run_search(&store, &search, 3, " \n\t ", 5).await,
        SearchOutcome::EmptyQuery
    );
    assert_eq!(search.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_restart_clears_session_at_any_index() {
    let search = StubSearch::new(imagine_results());

    for steps in 0..5 {
        let store: SessionStore<u64> = SessionStore::new();
        let SearchOutcome::Results(session) = run_search(&store, &search, 9, "imagine", 5).await
        else {
            panic!("expected results");
        };
        let sid = session.id();
        for _ in 0..steps {
            apply_action(&store, &9, CallbackAction::Next(sid)).await;
        }

        assert_eq!(
            apply_action(&store, &9, CallbackAction::Restart(sid)).await,
            ActionOutcome::Restarted
        );
        assert!(store.get(&9).await.is_none());
        assert_eq!(
            apply_action(&store, &9, CallbackAction::Previous(sid)).await,
            ActionOutcome::Expired
        );
    }
}

#[tokio::test]
async fn test_sessions_are_isolated_per_user() {
    let store: SessionStore<u64> = SessionStore::new();
    let search = StubSearch::new(imagine_results());

    let SearchOutcome::Results(first) = run_search(&store, &search, 1, "imagine", 5).await else {
        panic!("expected results");
    };
    let SearchOutcome::Results(second) = run_search(&store, &search, 2, "imagine", 5).await else {
        panic!("expected results");
    };
    assert_ne!(first.id(), second.id());

    // One user's payload does not work against another user's session
    assert_eq!(
        apply_action(&store, &2, CallbackAction::Next(first.id())).await,
        ActionOutcome::Expired
    );
    apply_action(&store, &1, CallbackAction::Next(first.id())).await;
    apply_action(&store, &2, CallbackAction::Restart(second.id())).await;

    assert_eq!(store.get(&1).await.map(|s| s.index()), Some(1));
    assert!(store.get(&2).await.is_none());
}

#[tokio::test]
async fn test_keyboard_download_button_targets_shown_track() {
    let store: SessionStore<u64> = SessionStore::new();
    let search = StubSearch::new(imagine_results());
    let SearchOutcome::Results(session) = run_search(&store, &search, 5, "imagine", 5).await
    else {
        panic!("expected results");
    };
    let sid = session.id();

    let ActionOutcome::Render(session) = apply_action(&store, &5, CallbackAction::Next(sid)).await
    else {
        panic!("expected render");
    };
    let expected = format!("dl:{}:1", sid.as_simple());
    let has_dl_1 = track_keyboard(&session)
        .inline_keyboard
        .iter()
        .flatten()
        .any(|button| {
            matches!(
                &button.kind,
                teloxide::types::InlineKeyboardButtonKind::CallbackData(data) if *data == expected
            )
        });
    assert!(has_dl_1);

    // The button payload resolves against the stored results
    let ActionOutcome::Download(track) =
        apply_action(&store, &5, CallbackAction::Download(sid, 1)).await
    else {
        panic!("expected download");
    };
    assert_eq!(track.video_id, "VOgFZfRVaww");
}

/// Payload of the first button in the given row of a result keyboard
fn payload(session: &ytmusic_dl_bot::session::Session, row: usize) -> String {
    match &track_keyboard(session).inline_keyboard[row][0].kind {
        teloxide::types::InlineKeyboardButtonKind::CallbackData(data) => data.clone(),
        other => panic!("unexpected button {other:?}"),
    }
}

#[tokio::test]
async fn test_old_keyboard_cannot_act_on_newer_search() {
    let store: SessionStore<u64> = SessionStore::new();

    let SearchOutcome::Results(imagine) =
        run_search(&store, &CatalogueSearch, 8, "imagine", 5).await
    else {
        panic!("expected results");
    };
    let old_next = payload(&imagine, 0);
    let old_download = payload(&imagine, 1);

    let SearchOutcome::Results(queen) = run_search(&store, &CatalogueSearch, 8, "queen", 5).await
    else {
        panic!("expected results");
    };
    assert_eq!(queen.current().title, "Bohemian Rhapsody");

    // Buttons still visible on the "imagine" message
    for data in [&old_download, &old_next] {
        let action = CallbackAction::parse(data).expect("known payload");
        assert_eq!(
            apply_action(&store, &8, action).await,
            ActionOutcome::Expired,
            "{data} must not act on the newer search"
        );
    }
    let old_restart = CallbackAction::Restart(imagine.id());
    assert_eq!(
        apply_action(&store, &8, old_restart).await,
        ActionOutcome::Expired
    );

    // The newer search is intact and its own buttons still work
    let current = store.get(&8).await.expect("queen session kept");
    assert_eq!(current.id(), queen.id());
    let ActionOutcome::Download(track) =
        apply_action(&store, &8, CallbackAction::Download(queen.id(), 0)).await
    else {
        panic!("expected download");
    };
    assert_eq!(track.title, "Bohemian Rhapsody");
}

#[tokio::test]
async fn test_download_valid_track_yields_audio() {
    let downloader: Arc<dyn AudioDownloader> = Arc::new(StubDownloader);
    let track = imagine_results().remove(0);

    match run_download::<DefaultBotView>(downloader.as_ref(), &track).await {
        DownloadOutcome::Ready(audio) => {
            assert_eq!(audio.title, "Imagine");
            assert_eq!(audio.performer, "John Lennon");
        }
        DownloadOutcome::Failed(text) => panic!("unexpected failure: {text}"),
    }
}

#[tokio::test]
async fn test_download_missing_id_yields_message() {
    let downloader = StubDownloader;
    let mut track = imagine_results().remove(0);
    track.video_id = String::new();

    match run_download::<DefaultBotView>(&downloader, &track).await {
        DownloadOutcome::Failed(text) => assert!(!text.is_empty()),
        DownloadOutcome::Ready(audio) => panic!("unexpected audio {audio:?}"),
    }
}
