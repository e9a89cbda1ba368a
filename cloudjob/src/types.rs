use std::collections::HashMap;
use uuid::Uuid;

pub type JobId = Uuid;
pub type InstanceId = String;
pub type ProviderName = String;
pub type Credentials = HashMap<String, String>;
