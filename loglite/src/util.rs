use loglite_gax::grpc::Status;

// tonic statuses are not cloneable; rebuild from code and message when
// one result has to reach several receivers.
pub(crate) fn clone_status(status: &Status) -> Status {
    Status::new(status.code(), status.message())
}
