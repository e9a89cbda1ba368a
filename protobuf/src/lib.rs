tonic::include_proto!("cloudjob");
