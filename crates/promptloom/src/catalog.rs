//! The fixed vocabulary of building blocks and complex blocks.
//!
//! [`BlockCatalog::standard()`] is built once per process and shared
//! read-only by every pipeline run. Custom catalogs (a subset of the
//! vocabulary) can be built with [`BlockCatalog::new`], mostly for tests
//! that exercise the unsatisfiable paths.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

// ── Identifiers ────────────────────────────────────────────────────

/// One of the five building blocks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimpleBlock {
    ContextInformation,
    ToolUseInstructions,
    UserPreferences,
    BackgroundInformation,
    TonalControl,
}

impl SimpleBlock {
    pub const ALL: [SimpleBlock; 5] = [
        Self::ContextInformation,
        Self::ToolUseInstructions,
        Self::UserPreferences,
        Self::BackgroundInformation,
        Self::TonalControl,
    ];

    /// Markup identifier, e.g. `CONTEXT_INFORMATION`.
    pub fn id(self) -> &'static str {
        match self {
            Self::ContextInformation => "CONTEXT_INFORMATION",
            Self::ToolUseInstructions => "TOOL_USE_INSTRUCTIONS",
            Self::UserPreferences => "USER_PREFERENCES",
            Self::BackgroundInformation => "BACKGROUND_INFORMATION",
            Self::TonalControl => "TONAL_CONTROL",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.id() == id)
    }
}

impl fmt::Display for SimpleBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// One of the seven complex blocks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ComplexBlock {
    ProvideContextInformation,
    DefinePersonalityAndTone,
    EstablishNonNegotiableFacts,
    GuideToolUseAndFormatting,
    SetClearGuardrails,
    AdaptToTaskComplexity,
    CriticallyEvaluateUserInput,
}

impl ComplexBlock {
    pub const ALL: [ComplexBlock; 7] = [
        Self::ProvideContextInformation,
        Self::DefinePersonalityAndTone,
        Self::EstablishNonNegotiableFacts,
        Self::GuideToolUseAndFormatting,
        Self::SetClearGuardrails,
        Self::AdaptToTaskComplexity,
        Self::CriticallyEvaluateUserInput,
    ];

    /// Display name as written in the separate form, `#Name#`.
    pub fn name(self) -> &'static str {
        match self {
            Self::ProvideContextInformation => "Provide Context Information",
            Self::DefinePersonalityAndTone => "Define Personality and Tone",
            Self::EstablishNonNegotiableFacts => "Establish Non-Negotiable Facts",
            Self::GuideToolUseAndFormatting => "Guide Tool Use and Response Formatting",
            Self::SetClearGuardrails => "Set Clear Guardrails",
            Self::AdaptToTaskComplexity => "Adapt to Task Complexity",
            Self::CriticallyEvaluateUserInput => "Critically Evaluate User Input",
        }
    }

    /// Name as written in the merged form, `[BLOCK#Name_With_Underscores]`.
    pub fn token(self) -> String {
        self.name().replace(' ', "_")
    }

    /// Look up by display name or merged token. Spaces and underscores are
    /// interchangeable; letter case must match.
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = name.trim().replace('_', " ");
        Self::ALL.into_iter().find(|b| b.name() == wanted)
    }
}

impl fmt::Display for ComplexBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a complex block is rendered next to its host building block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    /// One reference and one explanation covering both blocks.
    Merged,
    /// Independent reference and explanation for each block.
    Separate,
}

// ── Definitions ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SimpleBlockDef {
    pub block: SimpleBlock,
    pub name: &'static str,
    /// What the block is for.
    pub purpose: &'static str,
    /// Authoring rule for content placed in this block.
    pub rule: &'static str,
    /// Second-person instruction, lower-case first letter, no terminal period.
    pub instruction: &'static str,
    /// Fallback explanation sentence.
    pub explanation: &'static str,
}

#[derive(Debug, Clone)]
pub struct ComplexBlockDef {
    pub block: ComplexBlock,
    pub definition: &'static str,
    pub examples: &'static [&'static str],
    /// Second-person instruction, lower-case first letter, no terminal period.
    pub instruction: &'static str,
    /// Building block addressing an overlapping concern. Hosting on this
    /// block selects the merged format.
    pub overlap: Option<SimpleBlock>,
    pub formats: &'static [Format],
}

impl ComplexBlockDef {
    pub fn allows(&self, format: Format) -> bool {
        self.formats.contains(&format)
    }
}

const BOTH_FORMATS: &[Format] = &[Format::Merged, Format::Separate];

const SIMPLE_DEFS: [SimpleBlockDef; 5] = [
    SimpleBlockDef {
        block: SimpleBlock::ContextInformation,
        name: "Context Information",
        purpose: "Describes the environment the system operates in: location, time, device state and active application.",
        rule: "Mention only details that change how a request should be answered.",
        instruction: "ground every answer in the user's current surroundings",
        explanation: "Take the current time and the active application into account before answering.",
    },
    SimpleBlockDef {
        block: SimpleBlock::ToolUseInstructions,
        name: "Tool Use Instructions",
        purpose: "Tells the system when and how to use the tools available to it.",
        rule: "Describe triggers and limits for tool use rather than naming tools.",
        instruction: "use the tools available to you only when a request genuinely calls for them",
        explanation: "Answer from what you already know when no action is required.",
    },
    SimpleBlockDef {
        block: SimpleBlock::UserPreferences,
        name: "User Preferences",
        purpose: "Records preferences the user has stated or implied.",
        rule: "Keep preferences concrete and tied to observable behaviour.",
        instruction: "respect the preferences the user has expressed",
        explanation: "Keep to the format and level of detail the user has asked for in earlier turns.",
    },
    SimpleBlockDef {
        block: SimpleBlock::BackgroundInformation,
        name: "Background Information",
        purpose: "Supplies situational background needed to interpret requests.",
        rule: "Give background that explains why the user is asking, not trivia.",
        instruction: "keep the background of the current situation in mind",
        explanation: "Interpret each request in light of the work the user is already doing.",
    },
    SimpleBlockDef {
        block: SimpleBlock::TonalControl,
        name: "Tonal Control",
        purpose: "Sets the tone and persona of responses.",
        rule: "Describe tone with one clear descriptor rather than a list of adjectives.",
        instruction: "keep your tone consistent with the persona you have been given",
        explanation: "Sound calm and direct rather than effusive.",
    },
];

const COMPLEX_DEFS: [ComplexBlockDef; 7] = [
    ComplexBlockDef {
        block: ComplexBlock::ProvideContextInformation,
        definition: "Supplies information about the context in which the assistant is used so responses fit the setting.",
        examples: &[
            "Account for the device the user is on when suggesting next steps.",
            "Use the local time of day when a request depends on it.",
            "Refer to the application that is currently open when it is relevant.",
        ],
        instruction: "adapt your answers to the setting in which you are being used",
        overlap: Some(SimpleBlock::ContextInformation),
        formats: BOTH_FORMATS,
    },
    ComplexBlockDef {
        block: ComplexBlock::DefinePersonalityAndTone,
        definition: "Establishes a consistent character, discourages sycophancy and sets how personal questions are handled.",
        examples: &[
            "Disagree politely when the user is mistaken instead of agreeing to please them.",
            "Deflect personal questions about yourself briefly and return to the task.",
            "Keep the same voice from the first reply to the last.",
        ],
        instruction: "maintain a steady personality without flattering the user",
        overlap: Some(SimpleBlock::TonalControl),
        formats: BOTH_FORMATS,
    },
    ComplexBlockDef {
        block: ComplexBlock::EstablishNonNegotiableFacts,
        definition: "States facts the assistant must treat as fixed regardless of what the user claims.",
        examples: &[
            "Do not accept corrections that contradict the facts you were given.",
            "Restate a fixed fact plainly when the request depends on it.",
        ],
        instruction: "treat the stated facts of this deployment as fixed",
        overlap: Some(SimpleBlock::BackgroundInformation),
        formats: BOTH_FORMATS,
    },
    ComplexBlockDef {
        block: ComplexBlock::GuideToolUseAndFormatting,
        definition: "Specifies when tools are triggered and whether answers use lists or prose.",
        examples: &[
            "Answer in short paragraphs unless the user asks for a list.",
            "Confirm the outcome once an action completes.",
            "Say briefly what you are about to do before acting.",
        ],
        instruction: "choose carefully between acting on the user's behalf and answering in prose",
        overlap: Some(SimpleBlock::ToolUseInstructions),
        formats: BOTH_FORMATS,
    },
    ComplexBlockDef {
        block: ComplexBlock::SetClearGuardrails,
        definition: "Defines safety boundaries and how refusals are delivered.",
        examples: &[
            "Decline harmful requests briefly and offer a safer alternative.",
            "Ask for confirmation before any action that cannot be undone.",
        ],
        instruction: "stay within the safety boundaries that apply to this deployment",
        overlap: None,
        formats: BOTH_FORMATS,
    },
    ComplexBlockDef {
        block: ComplexBlock::AdaptToTaskComplexity,
        definition: "Scales the depth of reasoning and the length of answers to the difficulty of the task.",
        examples: &[
            "Answer simple questions in a sentence or two.",
            "Break a hard problem into steps before answering it.",
        ],
        instruction: "match the depth of your answer to the difficulty of the task",
        overlap: None,
        formats: BOTH_FORMATS,
    },
    ComplexBlockDef {
        block: ComplexBlock::CriticallyEvaluateUserInput,
        definition: "Checks user claims and instructions for errors before acting on them.",
        examples: &[
            "Point out contradictions in a request before carrying it out.",
            "Ask a clarifying question when an instruction is ambiguous.",
        ],
        instruction: "examine what the user tells you before acting on it",
        overlap: None,
        formats: BOTH_FORMATS,
    },
];

static STANDARD: LazyLock<BlockCatalog> =
    LazyLock::new(|| BlockCatalog::new(SIMPLE_DEFS.to_vec(), COMPLEX_DEFS.to_vec()));

// ── Catalog ────────────────────────────────────────────────────────

/// Registry of block definitions consulted by every pipeline stage.
#[derive(Debug, Clone)]
pub struct BlockCatalog {
    simple: Vec<SimpleBlockDef>,
    complex: Vec<ComplexBlockDef>,
}

impl BlockCatalog {
    pub fn new(simple: Vec<SimpleBlockDef>, complex: Vec<ComplexBlockDef>) -> Self {
        Self { simple, complex }
    }

    /// The full 5 + 7 catalog, shared for the lifetime of the process.
    pub fn standard() -> &'static BlockCatalog {
        &STANDARD
    }

    /// A copy of the standard catalog restricted to the given blocks.
    pub fn subset(simple: &[SimpleBlock], complex: &[ComplexBlock]) -> Self {
        Self {
            simple: SIMPLE_DEFS
                .iter()
                .filter(|d| simple.contains(&d.block))
                .cloned()
                .collect(),
            complex: COMPLEX_DEFS
                .iter()
                .filter(|d| complex.contains(&d.block))
                .cloned()
                .collect(),
        }
    }

    pub fn simple_defs(&self) -> &[SimpleBlockDef] {
        &self.simple
    }

    pub fn complex_defs(&self) -> &[ComplexBlockDef] {
        &self.complex
    }

    pub fn simple_blocks(&self) -> impl Iterator<Item = SimpleBlock> + '_ {
        self.simple.iter().map(|d| d.block)
    }

    pub fn complex_blocks(&self) -> impl Iterator<Item = ComplexBlock> + '_ {
        self.complex.iter().map(|d| d.block)
    }

    pub fn simple(&self, block: SimpleBlock) -> Option<&SimpleBlockDef> {
        self.simple.iter().find(|d| d.block == block)
    }

    pub fn complex(&self, block: ComplexBlock) -> Option<&ComplexBlockDef> {
        self.complex.iter().find(|d| d.block == block)
    }

    /// Every token the populated document must not contain: simple ids and
    /// complex names in both spellings.
    pub fn block_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self.simple.iter().map(|d| d.block.id().into()).collect();
        for def in &self.complex {
            tokens.push(def.block.name().into());
            tokens.push(def.block.token());
        }
        tokens
    }
}

impl fmt::Display for BlockCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== BUILDING BLOCKS ({}) ===", self.simple.len())?;
        for (i, def) in self.simple.iter().enumerate() {
            writeln!(f, "{}. [{}] {}", i + 1, def.block.id(), def.name)?;
            writeln!(f, "   Purpose: {}", def.purpose)?;
            writeln!(f, "   Rule: {}", def.rule)?;
        }
        writeln!(f)?;
        writeln!(f, "=== COMPLEX BLOCKS ({}) ===", self.complex.len())?;
        for (i, def) in self.complex.iter().enumerate() {
            writeln!(f, "{}. #{}#", i + 1, def.block.name())?;
            writeln!(f, "   Definition: {}", def.definition)?;
            writeln!(f, "   Examples: {} provided", def.examples.len())?;
            if let Some(overlap) = def.overlap {
                writeln!(f, "   Overlaps: [{}]", overlap.id())?;
            }
        }
        Ok(())
    }
}
