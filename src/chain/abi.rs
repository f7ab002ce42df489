//! Contract bindings for the oracle, factory and market contracts.
//!
//! Minimal ABIs covering just the entry points the resolver calls.

use alloy::sol;

sol! {
    /// On-chain market parameters, in the layout returned by `getMarketInfo()`.
    #[derive(Debug)]
    struct MarketInfo {
        uint8 subjectKind;
        uint8 windowKind;
        uint8 predicateOp;
        string subjectId;
        int256 threshold;
        uint8 valueDecimals;
        uint64 windowStart;
        uint64 windowEnd;
        uint64 resolveTime;
        bool resolved;
        bool cancelled;
        uint256 poolYes;
        uint256 poolNo;
    }

    #[sol(rpc)]
    interface IPredictionMarket {
        function getMarketInfo() external view returns (MarketInfo memory);
    }

    #[sol(rpc)]
    interface IMarketFactory {
        function isMarket(address market) external view returns (bool);
    }

    #[sol(rpc)]
    interface IResolutionOracle {
        function pendingResolutions(address market)
            external
            view
            returns (uint8 outcome, bytes32 dataHash, uint256 commitTime);

        function DISPUTE_WINDOW() external view returns (uint256);

        function commitResolution(address market, uint8 outcome, bytes32 dataHash) external;

        function finalizeResolution(address market) external;
    }
}
