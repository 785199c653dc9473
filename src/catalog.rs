/// Session template catalog: (program, week, session) → ordered phase list.
///
/// Templates are authored as blocks (a single timed phase, a repeated
/// fast/slow interval set, or a circuit of exercises with optional rest
/// between rounds) and flattened into phases once, when the catalog is built.
/// The built-in table carries both walking programs; an optional TOML file
/// can add programs or replace built-in sessions.

use crate::error::EngineError;

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// What a phase is for. Display only; timing never depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Warmup,
    Interval,
    Active,
    Cooldown,
    Exercise,
    Rest,
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PhaseKind::Warmup => "warmup",
            PhaseKind::Interval => "interval",
            PhaseKind::Active => "active",
            PhaseKind::Cooldown => "cooldown",
            PhaseKind::Exercise => "exercise",
            PhaseKind::Rest => "rest",
        };
        f.write_str(s)
    }
}

/// Position of a phase inside a repeated block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Round {
    pub current: u32,
    pub total: u32,
}

/// One timed segment of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Phase {
    pub label: String,
    pub duration_s: u32,
    pub high_intensity: bool,
    pub kind: PhaseKind,
    pub round: Option<Round>,
}

impl Phase {
    fn new(kind: PhaseKind, label: &str, duration_s: u32, high_intensity: bool) -> Self {
        Self {
            label: label.to_string(),
            duration_s,
            high_intensity,
            kind,
            round: None,
        }
    }

    fn in_round(mut self, current: u32, total: u32) -> Self {
        self.round = Some(Round { current, total });
        self
    }
}

/// Catalog key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TemplateKey {
    pub program: String,
    pub week: u32,
    pub session: u32,
}

impl TemplateKey {
    pub fn new(program: &str, week: u32, session: u32) -> Self {
        Self {
            program: program.to_string(),
            week,
            session,
        }
    }
}

impl std::fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.program, self.week, self.session)
    }
}

/// An immutable, flattened session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTemplate {
    pub key: TemplateKey,
    pub name: String,
    /// Identifier the backend knows this session by.
    pub seance_id: String,
    pub optional: bool,
    pub bonus: Vec<String>,
    pub phases: Vec<Phase>,
}

impl SessionTemplate {
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn phase(&self, index: usize) -> Option<&Phase> {
        self.phases.get(index)
    }

    /// Sum of all configured phase durations in seconds.
    pub fn total_duration_s(&self) -> u64 {
        self.phases.iter().map(|p| u64::from(p.duration_s)).sum()
    }

    /// A template the sequencer can run to completion: at least one phase,
    /// and no phase that would never count down.
    pub fn validate(&self) -> Result<(), String> {
        if self.phases.is_empty() {
            return Err("template has no phases".into());
        }
        if let Some((i, p)) = self.phases.iter().enumerate().find(|(_, p)| p.duration_s == 0) {
            return Err(format!("phase {i} ({}) has zero duration", p.label));
        }
        Ok(())
    }
}

// ── Authoring blocks ────────────────────────────────────────────────

/// A fast or slow leg of an interval set.
#[derive(Debug, Clone, Deserialize)]
pub struct IntervalLeg {
    pub label: String,
    pub duration_s: u32,
}

/// One exercise inside a circuit.
#[derive(Debug, Clone, Deserialize)]
pub struct Exercise {
    pub name: String,
    pub duration_s: u32,
    #[serde(default)]
    pub high_intensity: bool,
}

/// Authoring unit, expanded into one or more phases.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Single {
        kind: PhaseKind,
        label: String,
        duration_s: u32,
        #[serde(default)]
        high_intensity: bool,
    },
    /// fast → slow (→ medium) repeated `repetitions` times.
    Intervals {
        fast: IntervalLeg,
        slow: Option<IntervalLeg>,
        medium: Option<IntervalLeg>,
        repetitions: u32,
    },
    Circuit {
        label: String,
        rounds: u32,
        #[serde(default)]
        rest_between_s: u32,
        exercises: Vec<Exercise>,
    },
}

const REST_LABEL: &str = "Repos";

impl Block {
    fn expand_into(&self, out: &mut Vec<Phase>) {
        match self {
            Block::Single { kind, label, duration_s, high_intensity } => {
                out.push(Phase::new(*kind, label, *duration_s, *high_intensity));
            }
            Block::Intervals { fast, slow, medium, repetitions } => {
                for rep in 1..=*repetitions {
                    out.push(
                        Phase::new(PhaseKind::Interval, &fast.label, fast.duration_s, true)
                            .in_round(rep, *repetitions),
                    );
                    for leg in [slow, medium].into_iter().flatten() {
                        out.push(
                            Phase::new(PhaseKind::Interval, &leg.label, leg.duration_s, false)
                                .in_round(rep, *repetitions),
                        );
                    }
                }
            }
            Block::Circuit { label, rounds, rest_between_s, exercises } => {
                log::debug!("{label}: {rounds} rounds of {} exercises", exercises.len());
                for round in 1..=*rounds {
                    for ex in exercises {
                        out.push(
                            Phase::new(PhaseKind::Exercise, &ex.name, ex.duration_s, ex.high_intensity)
                                .in_round(round, *rounds),
                        );
                    }
                    if *rest_between_s > 0 && round < *rounds {
                        out.push(
                            Phase::new(PhaseKind::Rest, REST_LABEL, *rest_between_s, false)
                                .in_round(round, *rounds),
                        );
                    }
                }
            }
        }
    }
}

/// Flatten a block list into the phase sequence the sequencer runs.
pub fn expand(blocks: &[Block]) -> Vec<Phase> {
    let mut phases = Vec::new();
    for block in blocks {
        block.expand_into(&mut phases);
    }
    phases
}

// ── Catalog ─────────────────────────────────────────────────────────

/// Static lookup table, built once at startup.
#[derive(Debug, Default)]
pub struct SessionTemplateCatalog {
    templates: BTreeMap<TemplateKey, SessionTemplate>,
}

impl SessionTemplateCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Catalog with both built-in walking programs.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        for t in builtin_marche().into_iter().chain(builtin_ramadan()) {
            catalog.insert(t);
        }
        catalog
    }

    /// Built-in programs plus the overlay file at `path`, if one is configured.
    pub fn load(path: Option<&Path>) -> Result<Self, EngineError> {
        let mut catalog = Self::builtin();
        if let Some(path) = path {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| EngineError::Catalog(format!("{}: {e}", path.display())))?;
            let added = catalog.merge_toml(&contents)?;
            log::info!("Loaded {added} session template(s) from {}", path.display());
        }
        Ok(catalog)
    }

    fn insert(&mut self, template: SessionTemplate) {
        if let Err(reason) = template.validate() {
            // Kept so that starting it reports the problem instead of a lookup miss.
            log::warn!("Template {} is not runnable: {reason}", template.key);
        }
        self.templates.insert(template.key.clone(), template);
    }

    /// Parse a catalog file and add its sessions, replacing same-keyed ones.
    /// Returns the number of sessions added.
    pub fn merge_toml(&mut self, contents: &str) -> Result<usize, EngineError> {
        let file: CatalogFile =
            toml::from_str(contents).map_err(|e| EngineError::Catalog(e.to_string()))?;
        let mut added = 0;
        for program in file.programs {
            for week in program.weeks {
                for session in week.sessions {
                    let key = TemplateKey::new(&program.id, week.id, session.id);
                    let seance_id = session
                        .seance_id
                        .unwrap_or_else(|| format!("{}-{}-{}", program.id, week.id, session.id));
                    self.insert(SessionTemplate {
                        key,
                        name: session.name,
                        seance_id,
                        optional: session.optional,
                        bonus: session.bonus,
                        phases: expand(&session.blocks),
                    });
                    added += 1;
                }
            }
        }
        Ok(added)
    }

    /// Resolve a template the sequencer can start. Misses and unrunnable
    /// templates are both `InvalidTemplate`.
    pub fn lookup(&self, program: &str, week: u32, session: u32) -> Result<&SessionTemplate, EngineError> {
        let key = TemplateKey::new(program, week, session);
        let template = self
            .templates
            .get(&key)
            .ok_or_else(|| EngineError::invalid_template(program, week, session, "not in catalog"))?;
        template
            .validate()
            .map_err(|reason| EngineError::invalid_template(program, week, session, reason))?;
        Ok(template)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SessionTemplate> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    programs: Vec<ProgramEntry>,
}

#[derive(Debug, Deserialize)]
struct ProgramEntry {
    id: String,
    #[serde(default)]
    weeks: Vec<WeekEntry>,
}

#[derive(Debug, Deserialize)]
struct WeekEntry {
    id: u32,
    #[serde(default)]
    sessions: Vec<SessionEntry>,
}

#[derive(Debug, Deserialize)]
struct SessionEntry {
    id: u32,
    name: String,
    seance_id: Option<String>,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    bonus: Vec<String>,
    #[serde(default)]
    blocks: Vec<Block>,
}

// ── Built-in programs ───────────────────────────────────────────────

fn single(kind: PhaseKind, label: &str, duration_s: u32, high_intensity: bool) -> Block {
    Block::Single {
        kind,
        label: label.to_string(),
        duration_s,
        high_intensity,
    }
}

fn leg(label: &str, duration_s: u32) -> IntervalLeg {
    IntervalLeg {
        label: label.to_string(),
        duration_s,
    }
}

fn circuit(label: &str, rounds: u32, rest_between_s: u32, exercises: &[(&str, u32, bool)]) -> Block {
    Block::Circuit {
        label: label.to_string(),
        rounds,
        rest_between_s,
        exercises: exercises
            .iter()
            .map(|&(name, duration_s, high_intensity)| Exercise {
                name: name.to_string(),
                duration_s,
                high_intensity,
            })
            .collect(),
    }
}

/// Upper bound of a repetition range such as "10-15"; plain numbers pass through.
pub fn repetitions_upper_bound(range: &str) -> Option<u32> {
    let upper = range.rsplit('-').next()?;
    upper.trim().parse().ok()
}

const FAST: &str = "Marche rapide";
const SLOW: &str = "Marche lente";
const ACTIVE: &str = "Marche active";

/// Stroller walking program: one session per month, fast/slow intervals.
fn builtin_marche() -> Vec<SessionTemplate> {
    // (week id, name, fast s, slow leg, medium leg, repetitions, bonus)
    let months: [(u32, &str, u32, (&str, u32), Option<(&str, u32)>, &str, &[&str]); 8] = [
        (1, "Mois 1-2", 20, (SLOW, 45), None, "10-15", &[]),
        (2, "Mois 3", 25, (SLOW, 40), None, "15-20", &[]),
        (3, "Mois 4", 30, (ACTIVE, 30), None, "20", &["Demi squats lents pendant la récupération"]),
        (4, "Mois 5", 30, (ACTIVE, 35), None, "20-25", &["Squats", "Pas latéraux (avec élastique si possible)"]),
        (5, "Mois 6", 35, (SLOW, 25), None, "25", &[
            "Fentes avant marchées (4 derniers fractionnés)",
            "Poussée bras poussette x12",
        ]),
        (6, "Mois 7", 40, (ACTIVE, 20), None, "25", &[
            "10 fentes marchées",
            "15 sec gainage squat",
            "30 sec récup active",
            "x4 tours",
        ]),
        (7, "Mois 8", 20, (SLOW, 20), Some((ACTIVE, 20)), "20", &[
            "Pas latéraux x20",
            "Squats x10",
            "Jumping jack x20",
            "x4 tours",
        ]),
        (8, "Mois 9", 25, ("Récupération active", 30), None, "20-30", &[
            "Sumo Squats Sautés x15",
            "Mountain Climber 45 sec",
            "Jumping jacks 45 sec",
            "x4 tours",
        ]),
    ];

    months
        .iter()
        .map(|&(week, name, fast_s, (slow_label, slow_s), medium, reps, bonus)| {
            let block = Block::Intervals {
                fast: leg(FAST, fast_s),
                slow: Some(leg(slow_label, slow_s)),
                medium: medium.map(|(label, s)| leg(label, s)),
                repetitions: repetitions_upper_bound(reps).unwrap_or(1),
            };
            SessionTemplate {
                key: TemplateKey::new("marche", week, 1),
                name: name.to_string(),
                seance_id: format!("m{week}"),
                optional: false,
                bonus: bonus.iter().map(|b| b.to_string()).collect(),
                phases: expand(&[block]),
            }
        })
        .collect()
}

/// Four-week program of three sessions each, built from warmups, steady
/// blocks and circuits.
fn builtin_ramadan() -> Vec<SessionTemplate> {
    use PhaseKind::{Active, Cooldown, Warmup};

    let weeks: Vec<Vec<(&str, bool, Vec<Block>)>> = vec![
        vec![
            ("Séance 1 - Fractionné doux", false, vec![
                single(Warmup, SLOW, 300, false),
                circuit("Circuit fractionné", 4, 0, &[(FAST, 30, true), (SLOW, 30, false), (ACTIVE, 60, true)]),
                single(Active, "Marche bras actifs", 420, true),
                single(Cooldown, "Retour au calme", 300, false),
            ]),
            ("Séance 2 - Rythme continu", false, vec![
                single(Warmup, "Échauffement", 300, false),
                single(Active, "Marche active continue", 900, true),
                circuit("Fractionnés courts", 5, 0, &[(FAST, 20, true), (SLOW, 40, false)]),
                single(Cooldown, "Respiration + lente", 300, false),
            ]),
            ("Séance 3 - Douce (optionnelle)", true, vec![
                single(Active, "Marche libre", 1800, false),
                circuit("Circuit training", 4, 30, &[
                    ("5 squats", 30, true),
                    ("20 montées genoux", 45, true),
                    ("10 squats latéraux", 40, true),
                ]),
            ]),
        ],
        vec![
            ("Séance 1 - Fractionné court", false, vec![
                single(Warmup, "Échauffement", 300, false),
                circuit("Fractionnés intenses", 5, 0, &[(FAST, 40, true), ("Récupération", 20, false), (ACTIVE, 60, true)]),
                single(Cooldown, "Retour au calme", 480, false),
            ]),
            ("Séance 2 - Variée", false, vec![
                single(Warmup, "Marche fluide", 300, false),
                circuit("Alternance", 4, 0, &[(FAST, 30, true), (SLOW, 60, false)]),
                single(Active, "Marche + bras", 300, true),
                single(Cooldown, SLOW, 300, false),
            ]),
            ("Séance 3 - Posture (optionnelle)", true, vec![
                single(Active, ACTIVE, 1800, true),
                circuit("Circuit posture", 4, 30, &[
                    ("10 fentes alternées", 40, true),
                    ("20 talons fesses", 30, true),
                    ("Jumping jack sans saut", 30, true),
                ]),
            ]),
        ],
        vec![
            ("Séance 1 - Dynamique", false, vec![
                single(Warmup, "Échauffement", 300, false),
                circuit("Fractionnés intensifs", 5, 0, &[(FAST, 45, true), (SLOW, 15, false), (ACTIVE, 60, true)]),
                single(Cooldown, "Marche libre", 420, false),
            ]),
            ("Séance 2 - Challenge doux", false, vec![
                single(Warmup, "Marche cool", 300, false),
                circuit("Blocs longs", 4, 0, &[(FAST, 120, true), (SLOW, 60, false)]),
                single(Cooldown, SLOW, 600, false),
            ]),
            ("Séance 3 - Allégée (facultative)", true, vec![
                single(Active, "Marche continue (zéro fractionné)", 1200, false),
                circuit("Circuit récupération", 4, 30, &[
                    ("10 squats", 30, true),
                    ("10 ciseaux sans saut", 30, true),
                    ("15 montées genoux diago", 35, true),
                ]),
            ]),
        ],
        vec![
            ("Séance 1 - Relance douce", false, vec![
                single(Warmup, SLOW, 600, false),
                circuit("Fractionnés légers", 5, 0, &[(FAST, 30, true), (SLOW, 60, false)]),
                single(Active, "Allure modérée", 600, true),
            ]),
            ("Séance 2 - Énergie basse OK", false, vec![
                single(Warmup, "Marche libre", 300, false),
                circuit("Fractionnés doux", 4, 0, &[(FAST, 20, true), (SLOW, 45, false)]),
                single(Active, "Allure modérée", 300, true),
                single(Cooldown, "Lente + bras actifs", 300, false),
            ]),
            ("Séance 3 - Si possible", true, vec![
                single(Active, "Marche modérée", 900, false),
                circuit("Circuit final", 4, 30, &[
                    ("10 fentes alternées", 35, true),
                    ("10 jumping jack", 25, true),
                    ("10 squats", 30, true),
                ]),
            ]),
        ],
    ];

    let mut templates = Vec::new();
    for (w, sessions) in weeks.into_iter().enumerate() {
        let week = w as u32 + 1;
        for (s, (name, optional, blocks)) in sessions.into_iter().enumerate() {
            let session = s as u32 + 1;
            templates.push(SessionTemplate {
                key: TemplateKey::new("ramadan", week, session),
                name: name.to_string(),
                seance_id: format!("s{week}-{session}"),
                optional,
                bonus: Vec::new(),
                phases: expand(&blocks),
            });
        }
    }
    templates
}
