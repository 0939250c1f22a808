//! JPEG -> RAW resolution.
//!
//! Candidates come from an ordered cascade of lookups, strongest signal
//! first. Each stage only runs while the set is empty or holds more than one
//! RAW; a singleton ends the cascade. Optional identity filters then drop
//! candidates from the wrong body or lens. Anything other than exactly one
//! survivor is reported, never guessed.

use super::candidates::Candidates;
use super::creation_key::compose_creation_key;
use super::index::{IndexStore, RawIndexEntry};
use super::record::MetadataRecord;
use super::reference::ReferenceLookup;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchOptions {
    /// Only accept RAWs whose body serial equals the JPEG's (or its reference's).
    pub require_serial: bool,
    /// Only accept RAWs whose lens equals the JPEG's (or its reference's).
    pub require_lens: bool,
}

/// An identity filter that was requested but could not be enforced for an
/// image because neither the JPEG nor its reference carried the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caveat {
    SerialUnknown,
    LensUnknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<'a> {
    Unmatched,
    Matched(&'a RawIndexEntry),
    Ambiguous(Vec<&'a RawIndexEntry>),
}

#[derive(Debug, Clone)]
pub struct MatchOutcome<'a> {
    pub resolution: Resolution<'a>,
    pub used_reference: bool,
    /// Creation key used for narrowing, possibly adopted from the reference.
    pub creation_key: Option<String>,
    pub caveats: Vec<Caveat>,
}

impl<'a> MatchOutcome<'a> {
    pub fn best(&self) -> Option<&'a RawIndexEntry> {
        match self.resolution {
            Resolution::Matched(entry) => Some(entry),
            _ => None,
        }
    }

    pub fn was_ambiguous(&self) -> bool {
        matches!(self.resolution, Resolution::Ambiguous(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Same composed creation key.
    CreationKey,
    /// The JPEG's own frame counter.
    FrameCounter,
    /// The JPEG's `PreservedFileName` against RAW names and stems.
    PreservedName,
    /// Frame counter, then preserved name, of the reference copy.
    Reference,
}

const CASCADE: [Stage; 4] = [
    Stage::CreationKey,
    Stage::FrameCounter,
    Stage::PreservedName,
    Stage::Reference,
];

struct MatchContext<'j, 'r> {
    jpeg: &'j MetadataRecord,
    file_name: String,
    creation_key: Option<String>,
    lookup: Option<&'r mut dyn ReferenceLookup>,
    reference: Option<MetadataRecord>,
    used_reference: bool,
}

pub struct Matcher<'a> {
    index: &'a IndexStore,
    options: MatchOptions,
}

impl<'a> Matcher<'a> {
    pub fn new(index: &'a IndexStore, options: MatchOptions) -> Self {
        Self { index, options }
    }

    /// Resolve one JPEG. `lookup` is consulted only when the JPEG's own
    /// metadata leaves the candidate set empty or ambiguous.
    pub fn match_jpeg(
        &self,
        jpeg: &MetadataRecord,
        lookup: Option<&mut dyn ReferenceLookup>,
    ) -> MatchOutcome<'a> {
        let file_name = jpeg
            .source_path()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut ctx = MatchContext {
            jpeg,
            file_name,
            creation_key: compose_creation_key(jpeg),
            lookup,
            reference: None,
            used_reference: false,
        };

        let mut candidates = Candidates::default();
        for stage in CASCADE {
            if candidates.is_settled() {
                break;
            }
            candidates = self.apply(stage, &mut ctx, candidates);
            log::debug!(
                "{}: {} candidate(s) after {:?}",
                ctx.file_name,
                candidates.len(),
                stage
            );
        }

        let mut caveats = Vec::new();
        let candidates = self.apply_identity_filters(&ctx, candidates, &mut caveats);

        let resolution = match candidates.single() {
            Some(entry) => Resolution::Matched(entry),
            None if candidates.is_empty() => Resolution::Unmatched,
            None => Resolution::Ambiguous(candidates.into_vec()),
        };

        MatchOutcome {
            resolution,
            used_reference: ctx.used_reference,
            creation_key: ctx.creation_key,
            caveats,
        }
    }

    fn apply(
        &self,
        stage: Stage,
        ctx: &mut MatchContext<'_, '_>,
        candidates: Candidates<'a>,
    ) -> Candidates<'a> {
        let key = ctx.creation_key.as_deref();
        match stage {
            Stage::CreationKey => match key {
                Some(key) => self.index.by_creation_key(key).into_iter().collect(),
                None => candidates,
            },
            Stage::FrameCounter => {
                let found = self.frame_counter_candidates(ctx.jpeg.frame_counter(), key);
                replace_if_found(candidates, found)
            }
            Stage::PreservedName => {
                let name = ctx.jpeg.preserved_file_name();
                let found = self.preserved_name_candidates(name.as_deref(), key);
                replace_if_found(candidates, found)
            }
            Stage::Reference => self.reference_cross_check(ctx, candidates),
        }
    }

    fn frame_counter_candidates(&self, counter: Option<i64>, key: Option<&str>) -> Candidates<'a> {
        let Some(counter) = counter else {
            return Candidates::default();
        };
        self.index
            .by_frame_counter(counter)
            .into_iter()
            .collect::<Candidates>()
            .narrow_to_key(key)
    }

    fn preserved_name_candidates(&self, name: Option<&str>, key: Option<&str>) -> Candidates<'a> {
        let Some(name) = name else {
            return Candidates::default();
        };
        self.index
            .by_name(name)
            .into_iter()
            .chain(self.index.by_stem(name))
            .collect::<Candidates>()
            .narrow_to_key(key)
    }

    fn reference_cross_check(
        &self,
        ctx: &mut MatchContext<'_, '_>,
        mut candidates: Candidates<'a>,
    ) -> Candidates<'a> {
        if ctx.file_name.is_empty() {
            return candidates;
        }
        let Some(lookup) = ctx.lookup.as_deref_mut() else {
            return candidates;
        };
        let Some(reference) = lookup.resolve(&ctx.file_name) else {
            return candidates;
        };

        if ctx.creation_key.is_none() {
            ctx.creation_key = compose_creation_key(&reference);
        }
        let key = ctx.creation_key.as_deref();

        let by_counter = self.frame_counter_candidates(reference.frame_counter(), key);
        match by_counter.len() {
            0 => {}
            1 => {
                candidates = by_counter;
                ctx.used_reference = true;
            }
            _ => candidates = by_counter,
        }

        if !candidates.is_settled() {
            let name = reference.preserved_file_name();
            let by_name = self.preserved_name_candidates(name.as_deref(), key);
            match by_name.len() {
                0 => {}
                1 => {
                    candidates = by_name;
                    ctx.used_reference = true;
                }
                _ => {
                    // Two multi-candidate answers: keep what both agree on,
                    // else the name-based one.
                    let common = by_name.intersect(&candidates);
                    if common.is_empty() {
                        candidates = by_name;
                    } else {
                        ctx.used_reference |= common.is_settled();
                        candidates = common;
                    }
                }
            }
        }

        ctx.reference = Some(reference);
        candidates
    }

    fn apply_identity_filters(
        &self,
        ctx: &MatchContext<'_, '_>,
        mut candidates: Candidates<'a>,
        caveats: &mut Vec<Caveat>,
    ) -> Candidates<'a> {
        if candidates.is_empty() {
            return candidates;
        }

        if self.options.require_serial {
            let wanted = ctx
                .jpeg
                .body_serial()
                .or_else(|| ctx.reference.as_ref().and_then(MetadataRecord::body_serial));
            match wanted {
                Some(wanted) => {
                    candidates.retain(|e| same_identity(e.serial_number.as_deref(), &wanted))
                }
                None => {
                    log::info!(
                        "{}: --require-serial set but no serial number in JPEG or reference, not enforced",
                        ctx.file_name
                    );
                    caveats.push(Caveat::SerialUnknown);
                }
            }
        }

        if self.options.require_lens {
            let wanted = ctx
                .jpeg
                .lens()
                .or_else(|| ctx.reference.as_ref().and_then(MetadataRecord::lens));
            match wanted {
                Some(wanted) => candidates.retain(|e| same_identity(e.lens_id.as_deref(), &wanted)),
                None => {
                    log::info!(
                        "{}: --require-lens-id set but no LensID/LensModel in JPEG or reference, not enforced",
                        ctx.file_name
                    );
                    caveats.push(Caveat::LensUnknown);
                }
            }
        }

        candidates
    }
}

fn replace_if_found<'a>(current: Candidates<'a>, found: Candidates<'a>) -> Candidates<'a> {
    if found.is_empty() { current } else { found }
}

fn same_identity(have: Option<&str>, wanted: &str) -> bool {
    have.is_some_and(|have| have.trim().to_lowercase() == wanted.trim().to_lowercase())
}
