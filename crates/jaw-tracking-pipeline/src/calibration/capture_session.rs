//! Online capture of a full calibration set.
//!
//! Runs the state machine once per planned landmark, in plan order. The
//! tool tip is expressed in the frame of the body the landmark belongs to:
//! the moving body for mandibular landmarks, the reference body for
//! maxillary ones. The [`CalibrationSet`] appears only after the last
//! landmark is captured.

use jaw_tracking_core::{
    BodyId, CalibrationSet, ConfigurationError, LandmarkPoint, PoseSample, Real,
    check_landmark_geometry, ensure_config,
};
use jaw_tracking_linear::TipProbe;
use log::info;
use serde::{Deserialize, Serialize};

use super::config::CalibrationConfig;
use super::feedback::{FeedbackSink, LogFeedback};
use super::state_machine::{
    CalibrationError, CalibrationState, CalibrationStateMachine, OperatorCommand, TipSample,
};
use super::trigger::TriggerStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkSet {
    Mandibular,
    Maxillary,
}

impl LandmarkSet {
    pub fn label(self) -> &'static str {
        match self {
            LandmarkSet::Mandibular => "mandibular",
            LandmarkSet::Maxillary => "maxillary",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedLandmark {
    pub name: String,
    pub set: LandmarkSet,
}

impl PlannedLandmark {
    pub fn new(name: impl Into<String>, set: LandmarkSet) -> Self {
        Self {
            name: name.into(),
            set,
        }
    }
}

/// Which recorded body plays which role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyRoles {
    /// Head/maxilla body (e.g. `HP`).
    pub reference: BodyId,
    /// Mandible body (e.g. `MP`).
    pub moving: BodyId,
    /// Calibration tool (e.g. `CT`).
    pub tool: BodyId,
}

impl Default for BodyRoles {
    fn default() -> Self {
        Self {
            reference: BodyId::new("HP"),
            moving: BodyId::new("MP"),
            tool: BodyId::new("CT"),
        }
    }
}

impl BodyRoles {
    /// Reference, moving and tool ids, in that order.
    pub fn ids(&self) -> [BodyId; 3] {
        [
            self.reference.clone(),
            self.moving.clone(),
            self.tool.clone(),
        ]
    }

    pub fn body_for(&self, set: LandmarkSet) -> &BodyId {
        match set {
            LandmarkSet::Mandibular => &self.moving,
            LandmarkSet::Maxillary => &self.reference,
        }
    }
}

/// One synchronized packet for the three tracked bodies.
#[derive(Debug, Clone, Copy)]
pub struct FrameSamples<'a> {
    pub frame: usize,
    pub reference: &'a PoseSample,
    pub moving: &'a PoseSample,
    pub tool: &'a PoseSample,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureProgress {
    /// Working on landmark `index` of `total`.
    InProgress {
        index: usize,
        total: usize,
        state: CalibrationState,
    },
    Finished,
}

pub struct LandmarkCaptureSession<F: FeedbackSink = LogFeedback> {
    plan: Vec<PlannedLandmark>,
    probe: TipProbe,
    machine: CalibrationStateMachine<TriggerStrategy, F>,
    current: usize,
    mandibular: Vec<LandmarkPoint>,
    maxillary: Vec<LandmarkPoint>,
    calibration: Option<CalibrationSet>,
}

impl LandmarkCaptureSession {
    pub fn new(
        plan: Vec<PlannedLandmark>,
        probe: TipProbe,
        config: &CalibrationConfig,
        sample_rate: Real,
    ) -> Result<Self, ConfigurationError> {
        Self::with_feedback(plan, probe, config, sample_rate, LogFeedback)
    }
}

impl<F: FeedbackSink> LandmarkCaptureSession<F> {
    pub fn with_feedback(
        plan: Vec<PlannedLandmark>,
        probe: TipProbe,
        config: &CalibrationConfig,
        sample_rate: Real,
        feedback: F,
    ) -> Result<Self, ConfigurationError> {
        ensure_config!(!plan.is_empty(), "landmarks", "no landmark to capture");
        for set in [LandmarkSet::Mandibular, LandmarkSet::Maxillary] {
            let planned = plan.iter().filter(|p| p.set == set).count();
            ensure_config!(
                planned >= 3,
                "landmarks",
                "{} plan needs at least 3 landmarks, got {planned}",
                set.label()
            );
        }
        let mut machine = CalibrationStateMachine::new(
            config,
            sample_rate,
            TriggerStrategy::from_method(config.method, config.guided_order),
            feedback,
        )?;
        machine
            .arm(plan[0].name.clone())
            .map_err(|e| ConfigurationError::new("landmarks", e.to_string()))?;
        Ok(Self {
            plan,
            probe,
            machine,
            current: 0,
            mandibular: Vec::new(),
            maxillary: Vec::new(),
            calibration: None,
        })
    }

    pub fn plan(&self) -> &[PlannedLandmark] {
        &self.plan
    }

    /// Landmark currently being captured.
    pub fn current(&self) -> Option<&PlannedLandmark> {
        self.plan.get(self.current)
    }

    pub fn state(&self) -> CalibrationState {
        self.machine.state()
    }

    pub fn machine(&self) -> &CalibrationStateMachine<TriggerStrategy, F> {
        &self.machine
    }

    /// The finished set; `None` until every landmark is captured.
    pub fn calibration(&self) -> Option<&CalibrationSet> {
        self.calibration.as_ref()
    }

    pub fn into_calibration(self) -> Option<CalibrationSet> {
        self.calibration
    }

    pub fn progress(&self) -> CaptureProgress {
        if self.calibration.is_some() {
            CaptureProgress::Finished
        } else {
            CaptureProgress::InProgress {
                index: self.current,
                total: self.plan.len(),
                state: self.machine.state(),
            }
        }
    }

    pub fn command(
        &mut self,
        command: OperatorCommand,
    ) -> Result<CaptureProgress, CalibrationError> {
        self.machine.handle(command)?;
        Ok(self.progress())
    }

    /// Re-arm the current landmark after an abort.
    pub fn restart_current(&mut self) -> Result<(), CalibrationError> {
        let Some(planned) = self.plan.get(self.current) else {
            return Ok(());
        };
        self.machine.reset();
        self.machine.arm(planned.name.clone())
    }

    /// Feed one synchronized packet.
    pub fn process(
        &mut self,
        samples: FrameSamples<'_>,
    ) -> Result<CaptureProgress, CalibrationError> {
        let Some(planned) = self.plan.get(self.current) else {
            return Ok(self.progress());
        };
        let body = match planned.set {
            LandmarkSet::Mandibular => samples.moving,
            LandmarkSet::Maxillary => samples.reference,
        };
        let tip = match (body.pose(), samples.tool.pose()) {
            (Some(b), Some(t)) => {
                TipSample::at(samples.frame, b.timestamp, self.probe.tip_in_body(b, t))
            }
            _ => TipSample::gap(samples.frame, body.timestamp()),
        };
        if self.machine.process(&tip)? != CalibrationState::Captured {
            return Ok(self.progress());
        }
        let Some(captured) = self.machine.take_captured() else {
            return Ok(self.progress());
        };
        let point = LandmarkPoint::new(captured.name, vec![captured.frames], captured.position)?;
        let set = planned.set;
        let last_of_set = !self.plan[self.current + 1..].iter().any(|p| p.set == set);
        let points = match set {
            LandmarkSet::Mandibular => &mut self.mandibular,
            LandmarkSet::Maxillary => &mut self.maxillary,
        };
        points.push(point);
        self.machine.reset();
        if last_of_set {
            let positions: Vec<_> = points.iter().map(|p| p.captured_position).collect();
            if let Err(e) = check_landmark_geometry(set.label(), &positions) {
                // Drop the landmark that closed the set so `restart_current` re-captures it.
                points.pop();
                return Err(e.into());
            }
        }
        self.current += 1;
        if let Some(next) = self.plan.get(self.current) {
            self.machine.arm(next.name.clone())?;
            return Ok(self.progress());
        }
        let set = CalibrationSet::new(
            std::mem::take(&mut self.mandibular),
            std::mem::take(&mut self.maxillary),
        )?;
        info!(
            "calibration set complete: {} mandibular, {} maxillary landmarks",
            set.mandibular().len(),
            set.maxillary().len()
        );
        self.calibration = Some(set);
        Ok(CaptureProgress::Finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::feedback::FeedbackEvent;
    use jaw_tracking_core::{Iso3, LandmarkSetError, Pose, Quat, Vec3};
    use nalgebra::{Point3, Translation3};

    const RATE: Real = 100.0;
    const NAMES: [&str; 6] = ["m1", "m2", "m3", "x1", "x2", "x3"];

    fn config() -> CalibrationConfig {
        CalibrationConfig {
            stability_threshold: 0.2,
            stability_duration: 0.2,
            capture_window: 0.2,
            ..Default::default()
        }
    }

    fn plan() -> Vec<PlannedLandmark> {
        NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let set = if i < 3 {
                    LandmarkSet::Mandibular
                } else {
                    LandmarkSet::Maxillary
                };
                PlannedLandmark::new(*name, set)
            })
            .collect()
    }

    /// Tool placed so its tip touches `point` (given in `body` frame).
    fn tool_at(body: &Iso3, point: Vec3, tip: Vec3, t: Real) -> PoseSample {
        let world = body * Point3::from(point);
        let iso = Iso3::from_parts(Translation3::from(world.coords - tip), Quat::identity());
        Pose::from_iso(t, &iso).into()
    }

    struct Rig {
        tip: Vec3,
        hp: Iso3,
        mp: Iso3,
        frame: usize,
    }

    impl Rig {
        fn new(tip: Vec3) -> Self {
            Self {
                tip,
                hp: Iso3::translation(100.0, 0.0, 800.0),
                mp: Iso3::translation(100.0, -30.0, 790.0),
                frame: 0,
            }
        }

        /// Hold the tip on `target` until the current landmark changes or
        /// 60 frames pass.
        fn hold<F: FeedbackSink>(
            &mut self,
            session: &mut LandmarkCaptureSession<F>,
            set: LandmarkSet,
            target: Vec3,
        ) -> Result<CaptureProgress, CalibrationError> {
            let name = session.current().map(|p| p.name.clone());
            let body = match set {
                LandmarkSet::Mandibular => self.mp,
                LandmarkSet::Maxillary => self.hp,
            };
            let mut progress = session.progress();
            for _ in 0..60 {
                let t = self.frame as Real / RATE;
                let reference: PoseSample = Pose::from_iso(t, &self.hp).into();
                let moving: PoseSample = Pose::from_iso(t, &self.mp).into();
                let tool = tool_at(&body, target, self.tip, t);
                let frame = self.frame;
                self.frame += 1;
                progress = session.process(FrameSamples {
                    frame,
                    reference: &reference,
                    moving: &moving,
                    tool: &tool,
                })?;
                if session.current().map(|p| p.name.clone()) != name {
                    break;
                }
            }
            Ok(progress)
        }
    }

    #[test]
    fn captures_plan_in_order() {
        let tip = Vec3::new(0.0, 0.0, 60.0);
        let probe = TipProbe::new("CT", tip);
        let targets = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(20.0, 0.0, 0.0),
            Vec3::new(0.0, 15.0, 0.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(-20.0, 5.0, 0.0),
            Vec3::new(0.0, -10.0, 8.0),
        ];
        let mut session = LandmarkCaptureSession::with_feedback(
            plan(),
            probe,
            &config(),
            RATE,
            Vec::<FeedbackEvent>::new(),
        )
        .unwrap();
        let mut rig = Rig::new(tip);
        for (planned, target) in plan().iter().zip(&targets) {
            rig.hold(&mut session, planned.set, *target).unwrap();
        }
        assert_eq!(session.progress(), CaptureProgress::Finished);
        let set = session.calibration().unwrap();
        for (lm, target) in set
            .mandibular()
            .iter()
            .chain(set.maxillary())
            .zip(&targets)
        {
            assert!((lm.captured_position - target).norm() < 1e-9);
        }
        let captured = session
            .machine()
            .feedback()
            .iter()
            .filter(|e| matches!(e, FeedbackEvent::Captured { .. }))
            .count();
        assert_eq!(captured, 6);
    }

    #[test]
    fn collinear_set_rearms_its_last_landmark() {
        let tip = Vec3::new(0.0, 0.0, 60.0);
        let probe = TipProbe::new("CT", tip);
        let mut session = LandmarkCaptureSession::new(plan(), probe, &config(), RATE).unwrap();
        let mut rig = Rig::new(tip);
        let mandibular = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(20.0, 0.0, 0.0),
            Vec3::new(0.0, 15.0, 0.0),
        ];
        for target in mandibular {
            rig.hold(&mut session, LandmarkSet::Mandibular, target).unwrap();
        }
        rig.hold(&mut session, LandmarkSet::Maxillary, Vec3::new(0.0, 0.0, 0.0))
            .unwrap();
        rig.hold(&mut session, LandmarkSet::Maxillary, Vec3::new(10.0, 0.0, 0.0))
            .unwrap();

        let err = rig
            .hold(&mut session, LandmarkSet::Maxillary, Vec3::new(20.0, 0.0, 0.0))
            .unwrap_err();
        assert!(matches!(
            err,
            CalibrationError::Landmarks(LandmarkSetError::Degenerate { ref set, .. }) if set == "maxillary"
        ));
        assert_eq!(
            session.progress(),
            CaptureProgress::InProgress {
                index: 5,
                total: 6,
                state: CalibrationState::Idle,
            }
        );
        assert_eq!(session.current().map(|p| p.name.as_str()), Some("x3"));

        session.restart_current().unwrap();
        assert_eq!(session.state(), CalibrationState::Armed);
        let progress = rig
            .hold(&mut session, LandmarkSet::Maxillary, Vec3::new(0.0, 12.0, 4.0))
            .unwrap();
        assert_eq!(progress, CaptureProgress::Finished);
        let set = session.calibration().unwrap();
        assert_eq!(set.maxillary().len(), 3);
        assert_eq!(set.mandibular().len(), 3);
        assert!((set.maxillary()[2].captured_position - Vec3::new(0.0, 12.0, 4.0)).norm() < 1e-9);
    }

    #[test]
    fn plan_needs_three_landmarks_per_jaw() {
        let probe = TipProbe::new("CT", Vec3::zeros());
        let mut short = plan();
        short.remove(4);
        let err = LandmarkCaptureSession::new(short, probe, &config(), RATE)
            .err()
            .unwrap();
        assert_eq!(err.parameter, "landmarks");
        assert!(err.reason.contains("maxillary"));
    }

    #[test]
    fn cancel_leaves_no_calibration() {
        let probe = TipProbe::new("CT", Vec3::zeros());
        let mut session = LandmarkCaptureSession::new(plan(), probe, &config(), RATE).unwrap();
        let pose: PoseSample = Pose::from_iso(0.0, &Iso3::identity()).into();
        for frame in 0..25 {
            let sample = PoseSample::Pose(Pose::from_iso(frame as Real / RATE, &Iso3::identity()));
            session
                .process(FrameSamples {
                    frame,
                    reference: &pose,
                    moving: &sample,
                    tool: &sample,
                })
                .unwrap();
        }
        assert_eq!(session.state(), CalibrationState::Capturing);
        assert!(session.command(OperatorCommand::Cancel).is_err());
        assert!(session.calibration().is_none());
        session.restart_current().unwrap();
        assert_eq!(session.state(), CalibrationState::Armed);
    }
}
