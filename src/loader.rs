use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::decoder::processing::TileDecoder;
use crate::decoder::types::{DecodedTile, TileKey};
use crate::error::{DecodeError, LoadError};
use crate::provider::DataProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TileLoaderState {
    Init,
    Loading,
    Decoding,
    Ready,
    Error,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderEvent {
    Load,
    FetchSucceeded,
    FetchFailed,
    DecodeSucceeded,
    DecodeFailed,
    Cancel,
}

impl TileLoaderState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TileLoaderState::Ready | TileLoaderState::Error | TileLoaderState::Cancelled
        )
    }

    pub fn is_in_flight(self) -> bool {
        matches!(self, TileLoaderState::Loading | TileLoaderState::Decoding)
    }

    pub fn next(self, event: LoaderEvent) -> Option<TileLoaderState> {
        use LoaderEvent::*;
        use TileLoaderState::*;
        match (self, event) {
            (Init | Ready | Error | Cancelled, Load) => Some(Loading),
            (Loading, FetchSucceeded) => Some(Decoding),
            (Loading, FetchFailed) => Some(Error),
            (Decoding, DecodeSucceeded) => Some(Ready),
            (Decoding, DecodeFailed) => Some(Error),
            (Init | Loading | Decoding, Cancel) => Some(Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for TileLoaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

type LoadCycle = Shared<BoxFuture<'static, TileLoaderState>>;

struct Inner {
    state: TileLoaderState,
    decoded_tile: Option<Arc<DecodedTile>>,
    last_error: Option<LoadError>,
    cycle: u64,
    in_flight: Option<LoadCycle>,
    cancel: Option<watch::Sender<bool>>,
}

impl Inner {
    fn apply(&mut self, tile: TileKey, event: LoaderEvent) -> bool {
        match self.state.next(event) {
            Some(next) => {
                debug!(tile = %tile, from = %self.state, to = %next, "tile loader transition");
                self.state = next;
                true
            }
            None => false,
        }
    }
}

pub struct TileLoader {
    tile: TileKey,
    provider: Arc<dyn DataProvider>,
    decoder: Arc<dyn TileDecoder>,
    inner: Arc<Mutex<Inner>>,
}

impl fmt::Debug for TileLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("TileLoader")
            .field("tile", &self.tile)
            .field("state", &inner.state)
            .field("cycle", &inner.cycle)
            .field("has_decoded_tile", &inner.decoded_tile.is_some())
            .finish()
    }
}

impl TileLoader {
    pub fn new(
        tile: TileKey,
        provider: Arc<dyn DataProvider>,
        decoder: Arc<dyn TileDecoder>,
    ) -> Self {
        Self {
            tile,
            provider,
            decoder,
            inner: Arc::new(Mutex::new(Inner {
                state: TileLoaderState::Init,
                decoded_tile: None,
                last_error: None,
                cycle: 0,
                in_flight: None,
                cancel: None,
            })),
        }
    }

    pub fn tile_key(&self) -> TileKey {
        self.tile
    }

    pub fn state(&self) -> TileLoaderState {
        self.inner.lock().state
    }

    /// The current decoded tile. Only authoritative in `Ready`; after an
    /// error it is the stale tile of an earlier cycle.
    pub fn decoded_tile(&self) -> Option<Arc<DecodedTile>> {
        self.inner.lock().decoded_tile.clone()
    }

    pub fn last_error(&self) -> Option<LoadError> {
        self.inner.lock().last_error.clone()
    }

    pub async fn load_and_decode(&self) -> TileLoaderState {
        let cycle = {
            let mut inner = self.inner.lock();
            let joined = inner
                .in_flight
                .clone()
                .filter(|_| inner.state.is_in_flight());
            match joined {
                Some(cycle) => cycle,
                None => self.start_cycle(&mut inner),
            }
        };
        cycle.await
    }

    fn start_cycle(&self, inner: &mut Inner) -> LoadCycle {
        inner.apply(self.tile, LoaderEvent::Load);
        inner.cycle += 1;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        inner.cancel = Some(cancel_tx);

        let cycle = run_cycle(
            self.tile,
            Arc::clone(&self.provider),
            Arc::clone(&self.decoder),
            Arc::clone(&self.inner),
            inner.cycle,
            cancel_rx,
        )
        .boxed()
        .shared();
        inner.in_flight = Some(cycle.clone());
        cycle
    }

    pub fn cancel(&self) -> TileLoaderState {
        let mut inner = self.inner.lock();
        if inner.apply(self.tile, LoaderEvent::Cancel) {
            inner.decoded_tile = None;
            inner.in_flight = None;
            if let Some(cancel) = inner.cancel.as_ref() {
                cancel.send_replace(true);
            }
        }
        inner.state
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn complete(
    inner: &Mutex<Inner>,
    tile: TileKey,
    cycle: u64,
    event: LoaderEvent,
    outcome: Result<Option<DecodedTile>, LoadError>,
) -> TileLoaderState {
    let mut inner = inner.lock();
    if inner.cycle != cycle {
        return TileLoaderState::Cancelled;
    }
    if !inner.apply(tile, event) {
        return inner.state;
    }
    match outcome {
        Ok(Some(decoded)) => {
            inner.decoded_tile = Some(Arc::new(decoded));
            inner.last_error = None;
        }
        Ok(None) => {}
        Err(err) => {
            warn!(tile = %tile, %err, "tile load failed");
            inner.last_error = Some(err);
        }
    }
    if inner.state.is_terminal() {
        inner.in_flight = None;
    }
    inner.state
}

async fn run_cycle(
    tile: TileKey,
    provider: Arc<dyn DataProvider>,
    decoder: Arc<dyn TileDecoder>,
    inner: Arc<Mutex<Inner>>,
    cycle: u64,
    mut cancel: watch::Receiver<bool>,
) -> TileLoaderState {
    let fetched = tokio::select! {
        biased;
        _ = cancelled(&mut cancel) => return TileLoaderState::Cancelled,
        fetched = provider.get_tile(tile) => fetched,
    };
    let payload = match fetched {
        Ok(payload) => payload,
        Err(err) => {
            return complete(&inner, tile, cycle, LoaderEvent::FetchFailed, Err(err.into()));
        }
    };
    let state = complete(&inner, tile, cycle, LoaderEvent::FetchSucceeded, Ok(None));
    if state != TileLoaderState::Decoding {
        return state;
    }

    let task = tokio::task::spawn_blocking(move || decoder.decode(tile, &payload));
    let decoded = tokio::select! {
        biased;
        _ = cancelled(&mut cancel) => return TileLoaderState::Cancelled,
        joined = task => joined,
    };
    match decoded {
        Ok(Ok(decoded)) => complete(
            &inner,
            tile,
            cycle,
            LoaderEvent::DecodeSucceeded,
            Ok(Some(decoded)),
        ),
        Ok(Err(err)) => complete(&inner, tile, cycle, LoaderEvent::DecodeFailed, Err(err.into())),
        Err(join_err) => complete(
            &inner,
            tile,
            cycle,
            LoaderEvent::DecodeFailed,
            Err(DecodeError::Aborted(join_err.to_string()).into()),
        ),
    }
}
