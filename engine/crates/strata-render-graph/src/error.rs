use strata_gfx::GfxError;

#[derive(Debug, thiserror::Error)]
pub enum RgError {
    #[error("pass \"{pass}\" uses unregistered resource \"{label}\"")]
    UnresolvedResource { pass: String, label: String },

    #[error("alias chain starting at \"{label}\" is cyclic")]
    CyclicAlias { label: String },

    #[error("pass \"{pass}\" uses \"{label}\" as {expected}, but it is registered as another kind")]
    ResourceKindMismatch {
        pass: String,
        label: String,
        expected: &'static str,
    },

    #[error("backing handle of \"{label}\" is not a live resource")]
    InvalidBacking { label: String },

    #[error("failed to allocate backing for \"{label}\"")]
    Allocation {
        label: String,
        #[source]
        source: GfxError,
    },

    #[error("failed to create framebuffer for pass \"{pass}\"")]
    Framebuffer {
        pass: String,
        #[source]
        source: GfxError,
    },

    #[error("failed to create gpu timer queries")]
    Timer(#[source] GfxError),

    #[error("render graph is not compiled")]
    NotCompiled,
}

pub type RgResult<T> = Result<T, RgError>;
