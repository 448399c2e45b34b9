pub mod applications;
pub mod onboarding;
pub mod system;
pub mod tenant;
