//! Double-dispatch visitor over [`Expression`](super::Expression) nodes.

use crate::error::{SearchError, SearchResult};

use super::{
    BinaryExpression, ChainedExpression, CompartmentExpression, ExpressionKind, InExpression,
    IncludeExpression, MissingFieldExpression, MissingSearchParameterExpression,
    MultiaryExpression, NotExpression, SearchParameterExpression, SortExpression,
    StringExpression, UnionExpression,
};

/// A backend compiler over the expression tree.
///
/// `C` is the context threaded top-down through the traversal. The core node
/// kinds must be implemented by every backend. The remaining kinds have
/// provided methods that fail with [`SearchError::UnsupportedOperation`], so a
/// backend overrides only the extended nodes it can express.
pub trait ExpressionVisitor<C> {
    /// What a node compiles to.
    type Output;

    /// Name reported in unsupported-operation errors.
    fn backend_name(&self) -> &'static str;

    /// Compiles a [`SearchParameterExpression`].
    fn visit_search_parameter(
        &mut self,
        expr: &SearchParameterExpression,
        context: &C,
    ) -> SearchResult<Self::Output>;

    /// Compiles a [`BinaryExpression`].
    fn visit_binary(&mut self, expr: &BinaryExpression, context: &C) -> SearchResult<Self::Output>;

    /// Compiles a [`StringExpression`].
    fn visit_string(&mut self, expr: &StringExpression, context: &C) -> SearchResult<Self::Output>;

    /// Compiles a [`MultiaryExpression`].
    fn visit_multiary(
        &mut self,
        expr: &MultiaryExpression,
        context: &C,
    ) -> SearchResult<Self::Output>;

    /// Compiles a [`NotExpression`].
    fn visit_not(&mut self, expr: &NotExpression, context: &C) -> SearchResult<Self::Output>;

    // ===== extended nodes =====

    /// Compiles a [`UnionExpression`].
    fn visit_union(&mut self, _expr: &UnionExpression, _context: &C) -> SearchResult<Self::Output> {
        Err(SearchError::unsupported(self.backend_name(), ExpressionKind::Union))
    }

    /// Compiles a [`ChainedExpression`].
    fn visit_chained(
        &mut self,
        _expr: &ChainedExpression,
        _context: &C,
    ) -> SearchResult<Self::Output> {
        Err(SearchError::unsupported(self.backend_name(), ExpressionKind::Chained))
    }

    /// Compiles a [`CompartmentExpression`].
    fn visit_compartment(
        &mut self,
        _expr: &CompartmentExpression,
        _context: &C,
    ) -> SearchResult<Self::Output> {
        Err(SearchError::unsupported(self.backend_name(), ExpressionKind::Compartment))
    }

    /// Compiles an [`IncludeExpression`].
    fn visit_include(
        &mut self,
        _expr: &IncludeExpression,
        _context: &C,
    ) -> SearchResult<Self::Output> {
        Err(SearchError::unsupported(self.backend_name(), ExpressionKind::Include))
    }

    /// Compiles a [`MissingFieldExpression`].
    fn visit_missing_field(
        &mut self,
        _expr: &MissingFieldExpression,
        _context: &C,
    ) -> SearchResult<Self::Output> {
        Err(SearchError::unsupported(self.backend_name(), ExpressionKind::MissingField))
    }

    /// Compiles a [`MissingSearchParameterExpression`].
    fn visit_missing_search_parameter(
        &mut self,
        _expr: &MissingSearchParameterExpression,
        _context: &C,
    ) -> SearchResult<Self::Output> {
        Err(SearchError::unsupported(
            self.backend_name(),
            ExpressionKind::MissingSearchParameter,
        ))
    }

    /// Compiles an [`InExpression`].
    fn visit_in(&mut self, _expr: &InExpression, _context: &C) -> SearchResult<Self::Output> {
        Err(SearchError::unsupported(self.backend_name(), ExpressionKind::In))
    }

    /// Compiles a [`SortExpression`].
    fn visit_sort(&mut self, _expr: &SortExpression, _context: &C) -> SearchResult<Self::Output> {
        Err(SearchError::unsupported(self.backend_name(), ExpressionKind::Sort))
    }
}
