use crate::{
    bson::Document,
    conn::{Command, RawCommandResponse, StreamDescription},
    context::OperationContext,
    error::Result,
    operation::Operation,
};

pub(crate) fn build_test<T: Operation>(op: &mut T) -> Command {
    build_test_with_ctx(op, &OperationContext::new())
}

pub(crate) fn build_test_with_ctx<T: Operation>(op: &mut T, ctx: &OperationContext) -> Command {
    op.build(ctx, &StreamDescription::new_testing()).unwrap()
}

pub(crate) fn build_test_with_description<T: Operation>(
    op: &mut T,
    description: &StreamDescription,
) -> Command {
    op.build(&OperationContext::new(), description).unwrap()
}

pub(crate) fn handle_response_test<T: Operation>(op: &T, response_doc: Document) -> Result<T::O> {
    let raw = RawCommandResponse::with_document(response_doc).unwrap();
    op.handle_response(raw, &StreamDescription::new_testing())
}
