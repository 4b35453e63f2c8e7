//! Pose sources and the streaming capture driver.
//!
//! The calibration code only sees the [`PoseSource`] capability. Recorded
//! streams are read through [`RecordedSource`]; live feeds arrive through a
//! bounded channel ([`ChannelSource`]) filled by one producer thread. Pose
//! order is preserved per body. Operator commands are polled once per
//! packet cycle through a [`CommandSource`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, sync_channel};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use jaw_tracking_core::{BodyId, CalibrationSet, PoseSample, RigidBody};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::calibration::{
    BodyRoles, CalibrationError, CaptureProgress, FeedbackSink, FrameSamples,
    LandmarkCaptureSession, OperatorCommand,
};

/// Supplier of per-body pose samples.
pub trait PoseSource {
    /// Next sample of `body`; `None` once the stream has ended.
    fn next_pose(&mut self, body: &BodyId) -> Option<PoseSample>;

    /// Whether samples arrive from a live feed.
    fn is_live(&self) -> bool;
}

/// Finite recorded streams, one cursor per body.
#[derive(Debug, Clone, Default)]
pub struct RecordedSource {
    streams: HashMap<BodyId, (Vec<PoseSample>, usize)>,
}

impl RecordedSource {
    pub fn new(bodies: impl IntoIterator<Item = RigidBody>) -> Self {
        Self {
            streams: bodies
                .into_iter()
                .map(|b| (b.id, (b.samples, 0)))
                .collect(),
        }
    }

    /// Samples of `body` not yet delivered.
    pub fn remaining(&self, body: &BodyId) -> usize {
        self.streams
            .get(body)
            .map_or(0, |(samples, cursor)| samples.len() - cursor)
    }
}

impl PoseSource for RecordedSource {
    fn next_pose(&mut self, body: &BodyId) -> Option<PoseSample> {
        let (samples, cursor) = self.streams.get_mut(body)?;
        let sample = samples.get(*cursor).copied()?;
        *cursor += 1;
        Some(sample)
    }

    fn is_live(&self) -> bool {
        false
    }
}

/// A sample tagged with its body, as delivered by a live producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseEvent {
    pub body: BodyId,
    pub sample: PoseSample,
}

/// Per-body backlog kept by [`ChannelSource`] before the oldest sample is
/// dropped.
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// Live source fed through a bounded channel.
///
/// Serves a fixed set of bodies. Events for a served body other than the
/// requested one are buffered per body in arrival order, up to
/// `max_pending` samples each. Events for any other body are dropped.
#[derive(Debug)]
pub struct ChannelSource {
    rx: Receiver<PoseEvent>,
    pending: HashMap<BodyId, VecDeque<PoseSample>>,
    ignored: HashSet<BodyId>,
    max_pending: usize,
    timeout: Duration,
}

impl ChannelSource {
    /// Channel holding at most `capacity` undelivered events, serving
    /// `bodies`. A request waiting longer than `timeout` for its body ends
    /// the stream.
    pub fn bounded(
        capacity: usize,
        timeout: Duration,
        bodies: impl IntoIterator<Item = BodyId>,
    ) -> (SyncSender<PoseEvent>, Self) {
        let (tx, rx) = sync_channel(capacity);
        (
            tx,
            Self {
                rx,
                pending: bodies.into_iter().map(|b| (b, VecDeque::new())).collect(),
                ignored: HashSet::new(),
                max_pending: DEFAULT_MAX_PENDING,
                timeout,
            },
        )
    }

    /// Replay recorded bodies from a producer thread, frame by frame. Only
    /// the bodies in `serves` are delivered.
    pub fn replay(
        bodies: Vec<RigidBody>,
        serves: impl IntoIterator<Item = BodyId>,
        capacity: usize,
        timeout: Duration,
    ) -> (JoinHandle<()>, Self) {
        let (tx, source) = Self::bounded(capacity, timeout, serves);
        let handle = std::thread::spawn(move || {
            let frames = bodies.iter().map(RigidBody::len).max().unwrap_or(0);
            for frame in 0..frames {
                for body in &bodies {
                    let Some(sample) = body.samples.get(frame) else {
                        continue;
                    };
                    let event = PoseEvent {
                        body: body.id.clone(),
                        sample: *sample,
                    };
                    if tx.send(event).is_err() {
                        debug!("pose consumer hung up at frame {frame}");
                        return;
                    }
                }
            }
        });
        (handle, source)
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending.max(1);
        self
    }

    /// Samples buffered for `body`.
    pub fn pending(&self, body: &BodyId) -> usize {
        self.pending.get(body).map_or(0, VecDeque::len)
    }

    fn stash(&mut self, event: PoseEvent) {
        let Some(queue) = self.pending.get_mut(&event.body) else {
            if self.ignored.insert(event.body.clone()) {
                warn!("dropping samples of unserved body {}", event.body);
            }
            return;
        };
        if queue.len() >= self.max_pending {
            queue.pop_front();
            warn!(
                "backlog of {} exceeds {} samples, dropping the oldest",
                event.body, self.max_pending
            );
        }
        queue.push_back(event.sample);
    }
}

impl PoseSource for ChannelSource {
    fn next_pose(&mut self, body: &BodyId) -> Option<PoseSample> {
        let Some(queue) = self.pending.get_mut(body) else {
            warn!("{body} is not served by this source");
            return None;
        };
        if let Some(sample) = queue.pop_front() {
            return Some(sample);
        }
        loop {
            match self.rx.recv_timeout(self.timeout) {
                Ok(event) if &event.body == body => return Some(event.sample),
                Ok(event) => self.stash(event),
                Err(RecvTimeoutError::Timeout) => {
                    warn!("no pose for {body} within {:?}", self.timeout);
                    return None;
                }
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    fn is_live(&self) -> bool {
        true
    }
}

/// Operator commands, polled once per packet cycle.
pub trait CommandSource {
    /// Next command available at `frame`, if any.
    fn poll(&mut self, frame: usize) -> Option<OperatorCommand>;
}

/// No operator.
impl CommandSource for () {
    fn poll(&mut self, _frame: usize) -> Option<OperatorCommand> {
        None
    }
}

impl CommandSource for Receiver<OperatorCommand> {
    fn poll(&mut self, _frame: usize) -> Option<OperatorCommand> {
        self.try_recv().ok()
    }
}

/// A command to apply before the given frame is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledCommand {
    pub frame: usize,
    pub command: OperatorCommand,
}

/// Commands replayed at fixed frames (recorded sessions, tests).
#[derive(Debug, Clone, Default)]
pub struct ScheduledCommands {
    queue: VecDeque<ScheduledCommand>,
}

impl ScheduledCommands {
    pub fn new(mut commands: Vec<ScheduledCommand>) -> Self {
        commands.sort_by_key(|c| c.frame);
        Self {
            queue: commands.into(),
        }
    }
}

impl CommandSource for ScheduledCommands {
    fn poll(&mut self, frame: usize) -> Option<OperatorCommand> {
        if self.queue.front()?.frame <= frame {
            self.queue.pop_front().map(|c| c.command)
        } else {
            None
        }
    }
}

/// Drive `session` from `source` until every planned landmark is captured.
///
/// # Errors
///
/// The [`CalibrationError`] that stopped the session (timeout, lost
/// tracking, cancellation, end of stream), with the landmark and frame
/// attached as context.
pub fn run_online_capture<S, C, F>(
    source: &mut S,
    commands: &mut C,
    roles: &BodyRoles,
    session: &mut LandmarkCaptureSession<F>,
) -> Result<CalibrationSet>
where
    S: PoseSource + ?Sized,
    C: CommandSource + ?Sized,
    F: FeedbackSink,
{
    let mut frame = 0usize;
    loop {
        let landmark = session
            .current()
            .map(|p| p.name.clone())
            .unwrap_or_default();
        while let Some(command) = commands.poll(frame) {
            session
                .command(command)
                .with_context(|| format!("operator {command:?} at frame {frame}"))?;
        }
        let reference = next_sample(source, &roles.reference, &landmark)?;
        let moving = next_sample(source, &roles.moving, &landmark)?;
        let tool = next_sample(source, &roles.tool, &landmark)?;
        let progress = session
            .process(FrameSamples {
                frame,
                reference: &reference,
                moving: &moving,
                tool: &tool,
            })
            .with_context(|| format!("capturing landmark `{landmark}` at frame {frame}"))?;
        if progress == CaptureProgress::Finished {
            break;
        }
        frame += 1;
    }
    debug!("online capture finished after {} frames", frame + 1);
    session
        .calibration()
        .cloned()
        .ok_or_else(|| anyhow!("capture finished without a calibration set"))
}

fn next_sample<S: PoseSource + ?Sized>(
    source: &mut S,
    body: &BodyId,
    landmark: &str,
) -> Result<PoseSample> {
    source
        .next_pose(body)
        .ok_or_else(|| CalibrationError::StreamEnded { body: body.clone() })
        .with_context(|| format!("waiting for `{landmark}`"))
}
