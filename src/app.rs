use tracing::{info, warn};

use crate::{
    clock::Clock,
    command::{Command, Reply, Showing},
    payload::read_image,
    persistence::KeyValue,
    store::ContentStore,
    viewer::{Scheduler, TimerId, Viewer, ViewerState},
};

/// Owns the story store and the viewer and routes every event to them.
pub struct App<K, C, S> {
    store: ContentStore<K, C>,
    viewer: Viewer<S>,
}

impl<K: KeyValue, C: Clock, S: Scheduler> App<K, C, S> {
    pub fn new(store: ContentStore<K, C>, viewer: Viewer<S>) -> Self {
        App { store, viewer }
    }

    /// Handle one raw input line. Blank lines get no reply.
    pub fn handle_line(&mut self, line: &[u8]) -> Option<Reply> {
        let line = match std::str::from_utf8(line) {
            Ok(line) => line.trim(),
            Err(e) => {
                warn!(error = %e, "discarding input line");
                return Some(Reply::Error("input is not valid UTF-8".into()));
            }
        };
        if line.is_empty() {
            return None;
        }
        Some(match Command::deserialize(line) {
            Ok(command) => self.handle_command(command),
            Err(e) => Reply::Error(e.to_string()),
        })
    }

    pub fn handle_command(&mut self, command: Command) -> Reply {
        match command {
            Command::Add(payload) => Reply::Added(self.store.add(payload)),
            Command::Upload(path) => match read_image(&path) {
                Ok(payload) => {
                    let item = self.store.add(payload);
                    info!(id = %item.id, path = %path.display(), "uploaded story");
                    Reply::Added(item)
                }
                Err(e) => Reply::Error(e.to_string()),
            },
            Command::List => Reply::Items(self.store.list()),
            Command::View(index) => match self.viewer.start(self.store.list(), index) {
                Ok(true) => self.current(),
                Ok(false) => Reply::Error("no stories to show".into()),
                Err(e) => Reply::Error(e.to_string()),
            },
            Command::Next => self.navigate(|viewer, now| viewer.advance(now)),
            Command::Prev => self.navigate(|viewer, now| viewer.back(now)),
            Command::Close => {
                self.viewer.close();
                Reply::Closed
            }
            Command::Evict => Reply::Evicted(self.store.evict()),
            Command::Save => match self.store.persist() {
                Ok(()) => Reply::Ok,
                Err(e) => Reply::Error(e.to_string()),
            },
            Command::Quit => {
                self.viewer.close();
                Reply::Bye
            }
        }
    }

    /// A dwell timer elapsed. Returns the new screen, or `None` for a stale timer.
    pub fn dwell_elapsed(&mut self, id: TimerId) -> Option<Reply> {
        if self.viewer.dwell_elapsed(id, self.store.now()) {
            Some(self.current())
        } else {
            None
        }
    }

    pub fn sweep(&mut self) -> usize {
        self.store.evict()
    }

    /// Stop playback and flush the store.
    pub fn shutdown(mut self) -> K {
        self.viewer.close();
        self.store.dispose()
    }

    fn navigate<F>(&mut self, step: F) -> Reply
    where
        F: FnOnce(&mut Viewer<S>, u64),
    {
        if !matches!(self.viewer.state(), ViewerState::Viewing(_)) {
            warn!("navigation while not viewing");
            return Reply::Error("not viewing".into());
        }
        step(&mut self.viewer, self.store.now());
        self.current()
    }

    fn current(&self) -> Reply {
        match self.viewer.frame() {
            Some(frame) => Reply::Showing(Showing {
                position: frame.index + 1,
                total: frame.total,
                id: frame.item.id.clone(),
                payload: frame.item.payload.clone(),
                progress: frame.progress,
                has_previous: frame.has_previous,
                has_next: frame.has_next,
            }),
            None => Reply::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write, path::PathBuf, time::Duration};

    use super::App;
    use crate::{
        clock::ManualClock,
        command::{Command, Reply},
        persistence::{decode_items, KeyValue, MemoryKv},
        store::{ContentStore, StoreSettings},
        viewer::{Scheduler, TimerId, Viewer},
    };

    const DAY: Duration = Duration::from_millis(24 * 60 * 60 * 1000);

    #[derive(Default)]
    struct CountingScheduler(u64);

    impl Scheduler for CountingScheduler {
        fn schedule(&mut self, _after: Duration) -> TimerId {
            self.0 += 1;
            TimerId(self.0)
        }

        fn cancel(&mut self, _id: TimerId) {}
    }

    fn app(clock: ManualClock) -> App<MemoryKv, ManualClock, CountingScheduler> {
        let settings = StoreSettings {
            key: "stories".into(),
            ttl: DAY,
        };
        let (store, _) = ContentStore::init(MemoryKv::default(), clock, settings);
        App::new(
            store,
            Viewer::new(CountingScheduler::default(), Duration::from_secs(3)),
        )
    }

    fn position(reply: &Reply) -> usize {
        match reply {
            Reply::Showing(showing) => showing.position,
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    #[test]
    fn add_list_and_view() {
        let mut app = app(ManualClock::at(0));
        for text in ["one", "two", "three"] {
            assert!(matches!(
                app.handle_command(Command::Add(text.into())),
                Reply::Added(_)
            ));
        }
        match app.handle_command(Command::List) {
            Reply::Items(items) => {
                let payloads = items.iter().map(|i| i.payload.as_str()).collect::<Vec<_>>();
                assert_eq!(payloads, vec!["one", "two", "three"]);
            }
            other => panic!("unexpected reply {:?}", other),
        }

        assert_eq!(position(&app.handle_command(Command::View(1))), 2);
        assert_eq!(position(&app.handle_command(Command::Next)), 3);
        assert_eq!(position(&app.handle_command(Command::Prev)), 2);
        assert_eq!(app.handle_command(Command::Close), Reply::Closed);
        assert!(matches!(
            app.handle_command(Command::Next),
            Reply::Error(_)
        ));
    }

    #[test]
    fn dwell_plays_through_and_closes() {
        let mut app = app(ManualClock::at(0));
        app.handle_command(Command::Add("a".into()));
        app.handle_command(Command::Add("b".into()));
        app.handle_command(Command::View(0));

        assert_eq!(position(&app.dwell_elapsed(TimerId(1)).unwrap()), 2);
        assert_eq!(app.dwell_elapsed(TimerId(1)), None);
        assert_eq!(app.dwell_elapsed(TimerId(2)), Some(Reply::Closed));
    }

    #[test]
    fn expired_stories_leave_the_session() {
        let clock = ManualClock::at(0);
        let mut app = app(clock.clone());
        app.handle_command(Command::Add("a".into()));
        app.handle_command(Command::Add("b".into()));
        app.handle_command(Command::View(0));

        clock.advance(DAY + Duration::from_secs(3600));
        assert!(matches!(app.handle_command(Command::List), Reply::Items(items) if items.is_empty()));
        assert_eq!(app.handle_command(Command::Next), Reply::Closed);
        assert!(matches!(
            app.handle_command(Command::View(0)),
            Reply::Error(_)
        ));
    }

    #[test]
    fn live_stories_survive_sweep_mid_session() {
        let clock = ManualClock::at(0);
        let mut app = app(clock.clone());
        app.handle_command(Command::Add("a".into()));
        clock.advance(DAY / 2);
        app.handle_command(Command::Add("b".into()));
        app.handle_command(Command::Add("c".into()));
        app.handle_command(Command::View(0));

        clock.advance(DAY / 2);
        assert_eq!(app.sweep(), 1);
        match app.handle_command(Command::Next) {
            Reply::Showing(showing) => {
                assert_eq!(showing.position, 1);
                assert_eq!(showing.total, 2);
                assert_eq!(showing.payload, "b");
            }
            other => panic!("unexpected reply {:?}", other),
        }
        assert_eq!(position(&app.handle_command(Command::Next)), 2);
    }

    #[test]
    fn invalid_utf8_line_is_an_error_reply() {
        let mut app = app(ManualClock::at(0));
        assert!(matches!(app.handle_line(b"ADD one"), Some(Reply::Added(_))));
        assert!(matches!(
            app.handle_line(b"\xff\xfe bad"),
            Some(Reply::Error(_))
        ));
        assert_eq!(app.handle_line(b"   \r"), None);
        assert!(matches!(app.handle_line(b"FROB"), Some(Reply::Error(_))));
        assert!(matches!(
            app.handle_line(b"LIST\r"),
            Some(Reply::Items(items)) if items.len() == 1
        ));
        assert_eq!(app.handle_line(b"QUIT"), Some(Reply::Bye));
    }

    #[test]
    fn view_errors() {
        let mut app = app(ManualClock::at(0));
        assert!(matches!(app.handle_command(Command::View(0)), Reply::Error(_)));
        app.handle_command(Command::Add("a".into()));
        assert!(matches!(app.handle_command(Command::View(4)), Reply::Error(_)));
    }

    #[test]
    fn upload_validates_before_storing() {
        let mut app = app(ManualClock::at(0));
        let mut text = tempfile::NamedTempFile::new().unwrap();
        text.write_all(b"not an image").unwrap();
        assert!(matches!(
            app.handle_command(Command::Upload(text.path().to_path_buf())),
            Reply::Error(_)
        ));
        assert!(matches!(
            app.handle_command(Command::Upload(PathBuf::from("/definitely/missing.png"))),
            Reply::Error(_)
        ));

        let mut png = tempfile::NamedTempFile::new().unwrap();
        png.write_all(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR").unwrap();
        assert!(matches!(
            app.handle_command(Command::Upload(png.path().to_path_buf())),
            Reply::Added(_)
        ));
        assert!(matches!(app.handle_command(Command::List), Reply::Items(items) if items.len() == 1));
    }

    #[test]
    fn shutdown_flushes_store() {
        let mut app = app(ManualClock::at(0));
        app.handle_command(Command::Add("kept".into()));
        assert_eq!(app.handle_command(Command::Save), Reply::Ok);
        let kv = app.shutdown();
        let items = decode_items(&kv.read("stories").unwrap().unwrap()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].payload, "kept");
    }
}
