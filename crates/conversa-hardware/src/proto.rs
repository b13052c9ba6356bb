//! Generated gRPC client/message types for the hardware control service.

tonic::include_proto!("conversa.hardware.v1");
