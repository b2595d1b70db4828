use wayfinder_core::ServiceContext;

/// What runnable and callable services have in common.
pub trait ServiceIdentity {
    fn context(&self) -> &ServiceContext;

    /// `name/v<api>`.
    fn identification(&self) -> String {
        self.context().identification()
    }
}
