use log::info;

use crate::{
    model::{Service, ServiceScope},
    step::{CommandRunner, Executor, Invocation, Stage, StepError},
};

/// Enables and starts each service. Failures are expected in environments
/// without a running service manager and never stop the run.
pub fn enable_services<R: CommandRunner>(
    executor: &Executor<'_, R>,
    services: &[Service],
) -> Result<(), StepError> {
    let mut enabled = 0;
    for service in services {
        let invocation = match service.scope {
            ServiceScope::System => Invocation::new("systemctl")
                .args(["enable", "--now", service.name.as_str()])
                .elevated(executor.privilege()),
            ServiceScope::User => {
                Invocation::new("systemctl").args(["--user", "enable", "--now", service.name.as_str()])
            }
        };
        if executor.run(Stage::ServiceEnable, &service.name, &invocation)? {
            enabled += 1;
        }
    }
    info!("Enabled {enabled} of {} services", services.len());
    Ok(())
}
